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

//! The M³ runtime that is used by all activities
//!
//! The runtime builds on the TCU abstraction and the kernel interface of the `base` crate and
//! provides the gate-based IPC layer: capabilities and selectors, gates that are bound to TCU
//! endpoints on demand, system calls, activities, a small server framework, sessions, direct
//! pipes, and a virtual file system for boot modules.
//!
//! Every activity starts in [`env_run`], which initializes the runtime from the environment the
//! parent (or the kernel) placed at [`ENV_START`](cfg::ENV_START), calls the function the parent
//! selected, and exits with its result.

#![cfg_attr(not(feature = "loopback"), no_std)]

#[macro_use]
pub mod io;
#[macro_use]
pub mod com;
#[macro_use]
pub mod test;

// re-export the modules of base that are used throughout the runtime
pub use base::{
    borrow, boxed, build_vmsg, cell, cfg, col, const_assert, create_vmsg, elf, errors, format,
    kif, log, mem, quota, rc, serialize, tcu, time, tmif, util, vec,
};

pub mod cap;
pub mod client;
pub mod env;
pub mod server;
pub mod syscalls;
pub mod tiles;
pub mod upcalls;
pub mod vfs;
pub mod workloop;

pub use env::env_run;
