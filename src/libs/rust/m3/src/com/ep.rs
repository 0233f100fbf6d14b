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

use crate::cap::{CapFlags, Capability, Selector};
use crate::errors::Error;
use crate::kif::INVALID_SEL;
use crate::syscalls;
use crate::tcu::{EpId, INVALID_EP};
use crate::tiles::Activity;

/// Represents a TCU endpoint that can be used for communication
///
/// An endpoint is itself a capability, which is used to configure it for a gate. Standard
/// endpoints are preconfigured by the kernel and have no capability.
pub struct EP {
    cap: Capability,
    ep: EpId,
    replies: u32,
    std: bool,
}

/// The arguments for [`EP`] creations
#[derive(Copy, Clone, Debug)]
pub struct EPArgs {
    epid: EpId,
    act: Selector,
    replies: u32,
}

impl Default for EPArgs {
    fn default() -> Self {
        Self {
            epid: INVALID_EP,
            act: crate::kif::SEL_ACT,
            replies: 0,
        }
    }
}

impl EPArgs {
    /// Requests the specific endpoint `ep`
    pub fn epid(mut self, ep: EpId) -> Self {
        self.epid = ep;
        self
    }

    /// Sets the activity the endpoint is allocated for
    pub fn activity(mut self, act: Selector) -> Self {
        self.act = act;
        self
    }

    /// Sets the number of reply slots to reserve behind the endpoint
    pub fn replies(mut self, replies: u32) -> Self {
        self.replies = replies;
        self
    }
}

impl EP {
    /// Allocates a new endpoint
    pub fn new() -> Result<Self, Error> {
        Self::new_with(EPArgs::default())
    }

    /// Allocates a new endpoint with given arguments
    pub fn new_with(args: EPArgs) -> Result<Self, Error> {
        let sel = Activity::own().alloc_sel();
        let epid = match args.epid {
            INVALID_EP => None,
            id => Some(id),
        };
        let ep = syscalls::alloc_ep(sel, args.act, epid, args.replies)?;
        Ok(Self {
            cap: Capability::new(sel, CapFlags::empty()),
            ep,
            replies: args.replies,
            std: false,
        })
    }

    /// Binds the standard endpoint `ep`
    pub(crate) fn new_def_bind(ep: EpId) -> Self {
        Self {
            cap: Capability::new(INVALID_SEL, CapFlags::KEEP_CAP),
            ep,
            replies: 0,
            std: true,
        }
    }

    /// Returns the capability selector
    pub fn sel(&self) -> Selector {
        self.cap.sel()
    }

    /// Returns the endpoint id
    pub fn id(&self) -> EpId {
        self.ep
    }

    /// Returns the number of reply slots
    pub fn replies(&self) -> u32 {
        self.replies
    }

    /// Returns true if this is a standard endpoint
    pub fn is_std(&self) -> bool {
        self.std
    }

    /// Configures this endpoint for the gate `gate`
    pub fn configure(&self, gate: Selector) -> Result<(), Error> {
        self.configure_with(gate, 0)
    }

    pub(crate) fn configure_with(&self, gate: Selector, rbuf_addr: u64) -> Result<(), Error> {
        syscalls::activate(self.sel(), gate, rbuf_addr)
    }

    /// Invalidates this endpoint
    pub fn invalidate(&self) -> Result<(), Error> {
        self.configure(INVALID_SEL)
    }
}

impl fmt::Debug for EP {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EP[sel: {}, ep: {}, replies: {}, std: {}]",
            self.sel(),
            self.ep,
            self.replies,
            self.std
        )
    }
}
