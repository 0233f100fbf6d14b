/*
 * Copyright (C) 2018 Nils Asmussen <nils@os.inf.tu-dresden.de>
 * Economic rights: Technische Universitaet Dresden (Germany)
 *
 * Copyright (C) 2019-2022 Nils Asmussen, Barkhausen Institut
 *
 * This file is part of M3 (Microkernel-based SysteM for Heterogeneous Manycores).
 *
 * M3 is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License version 2 as
 * published by the Free Software Foundation.
 *
 * M3 is distributed in the hope that it will be useful, but
 * WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU
 * General Public License version 2 for more details.
 */

use core::fmt;

use crate::build_vmsg;
use crate::cap::Selector;
use crate::com::{GateIStream, SendGate};
use crate::errors::{Code, Error};
use crate::io::LogFlags;
use crate::kif::{self, resmng, Perm, TileDesc};
use crate::log;
use crate::mem::{GlobOff, MsgBuf};
use crate::serialize::Serialize;
use crate::tcu::{ActId, TileId};
use crate::tiles::Activity;

/// Represents a connection to the resource manager
///
/// Every activity is started with a connection to a resource manager, which hands out memory,
/// tiles, boot modules, and sessions to its children. The connection of a child is created by the
/// parent via [`ResMng::clone`], which announces the child to the resource manager.
pub struct ResMng {
    sgate: SendGate,
    act_sel: Selector,
}

impl ResMng {
    /// Creates a new `ResMng` with given [`SendGate`] to send requests to the resource manager.
    pub fn new(sgate: SendGate) -> Self {
        ResMng {
            sgate,
            act_sel: kif::INVALID_SEL,
        }
    }

    /// Returns the capability selector of the [`SendGate`] used for requests.
    pub fn sel(&self) -> Selector {
        self.sgate.sel()
    }

    /// Clones this connection for the child activity with id `id` and selector `act`.
    ///
    /// The resource manager creates the send gate for the child at our selector `sgate`, which
    /// needs to be delegated to the child afterwards.
    pub fn clone(&self, id: ActId, act: Selector, sgate: Selector, name: &str) -> Result<Self, Error> {
        Self::send_receive(&self.sgate, resmng::Operation::AddChild, resmng::AddChild {
            id: id as u64,
            sel: act,
            sgate,
            name,
        })?;
        Ok(ResMng {
            sgate: SendGate::new_owned_bind(sgate),
            act_sel: act,
        })
    }

    /// Opens a session at service `name` using selector `dst`, passing `arg` to the service.
    pub fn open_sess(&self, dst: Selector, name: &str, arg: &str) -> Result<(), Error> {
        Self::send_receive(&self.sgate, resmng::Operation::OpenSess, resmng::OpenSess {
            dst,
            name,
            arg,
        })
        .map(|_| ())
    }

    /// Closes the session with given selector.
    pub fn close_sess(&self, sel: Selector) -> Result<(), Error> {
        Self::send_receive(&self.sgate, resmng::Operation::CloseSess, resmng::CloseSess {
            sel,
        })
        .map(|_| ())
    }

    /// Allocates `size` bytes of physical memory with given permissions at selector `dst`.
    pub fn alloc_mem(&self, dst: Selector, size: GlobOff, perms: Perm) -> Result<(), Error> {
        Self::send_receive(&self.sgate, resmng::Operation::AllocMem, resmng::AllocMem {
            dst,
            size,
            perms,
        })
        .map(|_| ())
    }

    /// Frees the memory with given selector.
    pub fn free_mem(&self, sel: Selector) -> Result<(), Error> {
        Self::send_receive(&self.sgate, resmng::Operation::FreeMem, resmng::FreeMem { sel })
            .map(|_| ())
    }

    /// Allocates a tile that matches `desc` and assigns it to selector `dst`.
    pub fn alloc_tile(&self, dst: Selector, desc: TileDesc) -> Result<(TileId, TileDesc), Error> {
        let mut reply =
            Self::send_receive(&self.sgate, resmng::Operation::AllocTile, resmng::AllocTile {
                dst,
                desc,
            })?;
        let reply: resmng::AllocTileReply = reply.pop()?;
        Ok((reply.id, reply.desc))
    }

    /// Frees the tile with given selector.
    pub fn free_tile(&self, sel: Selector) -> Result<(), Error> {
        Self::send_receive(&self.sgate, resmng::Operation::FreeTile, resmng::FreeTile { sel })
            .map(|_| ())
    }

    /// Attaches to the boot module with given name using selector `dst` and returns its size.
    pub fn use_mod(&self, dst: Selector, name: &str) -> Result<GlobOff, Error> {
        let mut reply =
            Self::send_receive(&self.sgate, resmng::Operation::UseMod, resmng::UseMod {
                dst,
                name,
            })?;
        let reply: resmng::UseModReply = reply.pop()?;
        Ok(reply.size)
    }

    fn send_receive<R: Serialize>(
        sgate: &SendGate,
        op: resmng::Operation,
        req: R,
    ) -> Result<GateIStream<'static>, Error> {
        let reply_gate = Activity::own().def_rgate();

        let mut buf = MsgBuf::new();
        build_vmsg!(buf, op, req);

        let mut reply = GateIStream::new(sgate.call(&buf, reply_gate)?, reply_gate);
        match reply.pop::<Code>()? {
            Code::Success => Ok(reply),
            e => {
                log!(LogFlags::Debug, "resmng::{:?} failed: {:?}", op, e);
                Err(Error::new_with_origin(e, "resmng"))
            },
        }
    }
}

impl Drop for ResMng {
    fn drop(&mut self) {
        if self.act_sel == kif::INVALID_SEL || crate::tiles::is_leaving() {
            return;
        }
        if let Some(rmng) = Activity::try_own().and_then(|own| own.resmng().ok()) {
            Self::send_receive(&rmng.sgate, resmng::Operation::RemChild, resmng::RemChild {
                sel: self.act_sel,
            })
            .ok();
        }
    }
}

impl fmt::Debug for ResMng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResMng[sel: {}, act: {}]", self.sel(), self.act_sel)
    }
}
