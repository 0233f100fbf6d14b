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

use core::cell::RefCell;
use core::fmt;

use crate::cap::{CapFlags, Capability, Selector};
use crate::com::EP;
use crate::errors::Error;
use crate::tcu::EpId;
use crate::tiles::{self, Activity};

/// A gate is a capability that is bound to an endpoint on first use
pub(crate) struct Gate {
    cap: Capability,
    ep: RefCell<Option<EP>>,
}

impl Gate {
    pub fn new(sel: Selector, flags: CapFlags) -> Self {
        Self {
            cap: Capability::new(sel, flags),
            ep: RefCell::new(None),
        }
    }

    pub fn new_with_ep(sel: Selector, flags: CapFlags, ep: EP) -> Self {
        Self {
            cap: Capability::new(sel, flags),
            ep: RefCell::new(Some(ep)),
        }
    }

    pub fn sel(&self) -> Selector {
        self.cap.sel()
    }

    pub fn flags(&self) -> CapFlags {
        self.cap.flags()
    }

    pub fn set_flags(&self, flags: CapFlags) {
        self.cap.set_flags(flags);
    }

    /// Returns the endpoint id, if the gate is activated
    pub fn ep_id(&self) -> Option<EpId> {
        self.ep.borrow().as_ref().map(|ep| ep.id())
    }

    /// Returns the endpoint id, activating the gate if required
    pub fn activate(&self) -> Result<EpId, Error> {
        if let Some(id) = self.ep_id() {
            return Ok(id);
        }

        let ep = Activity::own().epmng_mut().activate(self.sel())?;
        let id = ep.id();
        self.ep.replace(Some(ep));
        Ok(id)
    }

    /// Binds the gate to the already configured endpoint `ep`
    pub fn set_ep(&self, ep: EP) {
        self.ep.replace(Some(ep));
    }

    /// Removes the endpoint from the gate and returns it
    pub fn take_ep(&self) -> Option<EP> {
        self.ep.take()
    }

    /// Releases the endpoint of the gate, if any
    pub fn deactivate(&self) {
        if let Some(ep) = self.ep.take() {
            Activity::own().epmng_mut().release(ep, true);
        }
    }
}

impl Drop for Gate {
    fn drop(&mut self) {
        if let Some(ep) = self.ep.get_mut().take() {
            if tiles::is_leaving() {
                core::mem::forget(ep);
            }
            else if let Some(own) = Activity::try_own() {
                own.epmng_mut().release(ep, true);
            }
        }
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gate[sel: {}, ep: {:?}]", self.sel(), self.ep_id())
    }
}
