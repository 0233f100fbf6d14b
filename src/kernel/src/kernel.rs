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

//! The kernel for the loopback platform
//!
//! The kernel runs on its own tile and owns the capabilities of all activities. It consumes the
//! system calls of activities, hands out resources as the resource manager, and forwards the
//! session operations to services. [`Machine`] boots the kernel together with a root activity.

mod cap;
mod com;
mod ktcu;
mod mem;
mod platform;
mod resmng;
mod state;
mod syscalls;
mod tiles;
mod workloop;

pub use platform::{Machine, MachineConfig, KERNEL_TILE};
