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

//! The communication of the kernel with services
//!
//! Requests to services (opening sessions, exchanging capabilities, closing sessions) are sent
//! asynchronously via the service's [`SendQueue`]. The kernel remembers what to do with the reply
//! as a [`PendingOp`] and continues the operation as soon as the reply arrives.

mod sendqueue;
mod service;

pub use self::sendqueue::SendQueue;
pub use self::service::Service;

use base::errors::{Code, Error};
use base::io::LogFlags;
use base::kif::{CapRngDesc, CapSel};
use base::log;
use base::mem::MsgBuf;
use base::rc::Rc;
use base::tcu::{ActId, Label, Message};

use crate::ktcu;
use crate::resmng;
use crate::state::Kernel;
use crate::syscalls;

/// An operation that waits for the reply of a service
pub enum PendingOp {
    /// Opening a session on behalf of the resource-manager client `act`
    Open {
        srv: Rc<Service>,
        act: ActId,
        dst: CapSel,
        msg: &'static Message,
    },
    /// A capability exchange over a session, requested by a system call of `act`
    Exchange {
        srv: Rc<Service>,
        act: ActId,
        target: ActId,
        crd: CapRngDesc,
        obtain: bool,
        msg: &'static Message,
    },
    /// The notification that a session has been closed
    Close { srv: Rc<Service> },
}

impl PendingOp {
    fn service(&self) -> &Rc<Service> {
        match self {
            Self::Open { srv, .. } | Self::Exchange { srv, .. } | Self::Close { srv } => srv,
        }
    }
}

/// Sends `msg` to the service and continues with `op` when the reply arrives
pub fn send_request(k: &mut Kernel, msg: MsgBuf, op: PendingOp) -> Result<(), Error> {
    let srv = op.service().clone();
    let id = k.alloc_req_id();
    k.pending.insert(id, op);
    let res = srv.queue().borrow_mut().send(id, msg);
    if let Err(e) = res {
        log!(LogFlags::KernServ, "Unable to send request to {:?}: {:?}", srv, e);
        k.pending.remove(&id);
        return Err(e);
    }
    Ok(())
}

/// Handles a reply from a service on [`KSRV_EP`](ktcu::KSRV_EP)
pub fn handle_reply(k: &mut Kernel, msg: &'static Message) {
    let id: Label = msg.header.label();
    match k.pending.remove(&id) {
        Some(op) => {
            let failed = op.service().queue().borrow_mut().received_reply();
            complete(k, op, Ok(msg));
            for (fid, e) in failed {
                if let Some(fop) = k.pending.remove(&fid) {
                    complete(k, fop, Err(e));
                }
            }
        },
        None => log!(LogFlags::KernServ, "Ignoring reply for unknown request {}", id),
    }
    ktcu::ack_msg(ktcu::KSRV_EP, msg);
}

/// Aborts all requests to `srv`, which is going away
pub fn abort_service(k: &mut Kernel, srv: &Rc<Service>) {
    let ids = srv.queue().borrow_mut().abort();
    for id in ids {
        if let Some(op) = k.pending.remove(&id) {
            complete(k, op, Err(Error::new(Code::RecvGone)));
        }
    }
}

fn complete(k: &mut Kernel, op: PendingOp, reply: Result<&'static Message, Error>) {
    match op {
        PendingOp::Open { srv, act, dst, msg } => {
            resmng::finish_open_sess(k, &srv, act, dst, msg, reply)
        },
        PendingOp::Exchange {
            srv,
            act,
            target,
            crd,
            obtain,
            msg,
        } => syscalls::finish_exchange_sess(k, &srv, act, target, crd, obtain, msg, reply),
        PendingOp::Close { srv } => {
            if let Err(e) = reply {
                log!(LogFlags::KernServ, "Closing session at {} failed: {:?}", srv.name(), e);
            }
        },
    }
}
