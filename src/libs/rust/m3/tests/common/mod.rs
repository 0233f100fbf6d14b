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

//! Boots a loopback machine with the kernel and runs a root activity on it

#![allow(dead_code)]

use kernel::{Machine, MachineConfig};
use m3::env::Lambda;
use m3::errors::Code;

/// Runs `root` as root activity on a machine with the given configuration and returns its exit
/// code
pub fn run_with(cfg: MachineConfig, root: Lambda) -> Code {
    Machine::new(cfg).run(m3::env_run, root as usize)
}

/// Runs `root` as root activity on a machine with the default configuration
pub fn run(root: Lambda) -> Code {
    run_with(MachineConfig::default(), root)
}
