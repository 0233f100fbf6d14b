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

//! Contains the capability abstraction
//!
//! A capability is referred to by a [`Selector`] in the capability table of an activity. The
//! [`Capability`] type owns such a selector and revokes the capability when dropped, unless
//! [`CapFlags::KEEP_CAP`] is set.

mod selspace;

use bitflags::bitflags;
use core::cell::Cell;
use core::fmt;

use crate::io::LogFlags;
use crate::kif::{self, CapRngDesc, CapType};
use crate::log;
use crate::syscalls;
use crate::tiles::{self, Activity};

pub use self::selspace::SelSpace;

/// A capability selector
pub type Selector = kif::CapSel;

bitflags! {
    /// Capability flags
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct CapFlags : u32 {
        /// If set, the capability is not revoked on drop
        const KEEP_CAP      = 0x1;
    }
}

/// Represents a capability of the own activity
pub struct Capability {
    sel: Selector,
    flags: Cell<CapFlags>,
}

impl Capability {
    /// Creates a new capability with given selector and flags
    pub const fn new(sel: Selector, flags: CapFlags) -> Self {
        Self {
            sel,
            flags: Cell::new(flags),
        }
    }

    /// Creates a capability for `sel` that is not revoked on drop
    pub const fn new_bind(sel: Selector) -> Self {
        Self::new(sel, CapFlags::KEEP_CAP)
    }

    /// Returns the selector
    pub fn sel(&self) -> Selector {
        self.sel
    }

    /// Returns the flags
    pub fn flags(&self) -> CapFlags {
        self.flags.get()
    }

    /// Sets the flags to `flags`
    pub fn set_flags(&self, flags: CapFlags) {
        self.flags.set(flags);
    }

    /// Returns the capability range descriptor for this capability
    pub fn crd(&self) -> CapRngDesc {
        CapRngDesc::new(CapType::Object, self.sel, 1)
    }

    fn release(&mut self) {
        if self.flags().contains(CapFlags::KEEP_CAP) || self.sel == kif::INVALID_SEL {
            return;
        }
        // revocations while leaving the activity are done by the kernel
        if tiles::is_leaving() {
            return;
        }
        if let Some(own) = Activity::try_own() {
            if let Err(e) = syscalls::revoke(kif::SEL_ACT, self.crd(), true) {
                log!(
                    LogFlags::Error,
                    "Unable to revoke capability {}: {:?}",
                    self.sel,
                    e
                );
                return;
            }
            own.free_sel(self.sel);
        }
    }
}

impl Drop for Capability {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cap[sel={}, flags={:?}]", self.sel, self.flags())
    }
}
