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
use crate::quota::Quota;
use crate::rc::Rc;
use crate::syscalls;
use crate::tiles::Activity;

/// A share of the kernel's memory
///
/// Every kernel object an activity creates is paid from its kernel memory. The root activity
/// receives all of it at boot and hands parts to children via [`KMem::derive`].
pub struct KMem {
    cap: Capability,
}

impl KMem {
    /// Binds the kernel memory at `sel` without revoking it on drop
    pub fn new_bind(sel: Selector) -> Self {
        let cap = Capability::new(sel, CapFlags::KEEP_CAP);
        Self { cap }
    }

    pub fn sel(&self) -> Selector {
        self.cap.sel()
    }

    /// Asks the kernel for the total and the remaining bytes
    pub fn quota(&self) -> Result<Quota<usize>, Error> {
        syscalls::kmem_quota(self.sel())
    }

    /// Moves `quota` bytes into a new kernel memory object
    pub fn derive(&self, quota: usize) -> Result<Rc<Self>, Error> {
        let sel = Activity::own().alloc_sel();
        syscalls::derive_kmem(self.sel(), sel, quota)?;
        let cap = Capability::new(sel, CapFlags::empty());
        Ok(Rc::new(Self { cap }))
    }
}

impl fmt::Debug for KMem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KMem").field("sel", &self.sel()).finish()
    }
}
