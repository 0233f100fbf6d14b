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

use crate::cap::{CapFlags, Capability, Selector};
use crate::errors::Error;
use crate::kif::syscalls::SemOp;
use crate::syscalls;
use crate::tiles::Activity;

/// A counting semaphore that lives in the kernel
///
/// [`Semaphore::down`] blocks until the value is positive. Semaphores are shared between
/// activities by delegating the capability.
#[derive(Debug)]
pub struct Semaphore {
    cap: Capability,
}

impl Semaphore {
    /// Creates a semaphore with initial value `value`
    pub fn create(value: u32) -> Result<Self, Error> {
        let sel = Activity::own().alloc_sel();
        syscalls::create_sem(sel, value)?;
        let cap = Capability::new(sel, CapFlags::empty());
        Ok(Self { cap })
    }

    /// Uses the semaphore at `sel`, which is owned by someone else
    pub fn bind(sel: Selector) -> Self {
        let cap = Capability::new_bind(sel);
        Self { cap }
    }

    pub fn sel(&self) -> Selector {
        self.cap.sel()
    }

    /// Increments the value and wakes up a waiter, if any
    pub fn up(&self) -> Result<(), Error> {
        self.ctrl(SemOp::Up)
    }

    /// Waits until the value is positive and decrements it
    pub fn down(&self) -> Result<(), Error> {
        self.ctrl(SemOp::Down)
    }

    fn ctrl(&self, op: SemOp) -> Result<(), Error> {
        syscalls::sem_ctrl(self.sel(), op)
    }
}
