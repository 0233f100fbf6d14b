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

//! Register access via the memory-mapped register file of the TCU

use crate::cfg;
use crate::tcu::{Reg, RegKey};

/// The base address of the TCU's MMIO area
pub const MMIO_ADDR: usize = 0xF000_0000;
/// The size of the TCU's MMIO area
pub const MMIO_SIZE: usize = cfg::PAGE_SIZE * 2;

pub fn read_reg(key: RegKey) -> Reg {
    // safety: the register file is mapped at MMIO_ADDR and the index is within it
    unsafe { (reg_addr(key) as *const Reg).read_volatile() }
}

pub fn write_reg(key: RegKey, val: Reg) {
    // safety: see read_reg
    unsafe { (reg_addr(key) as *mut Reg).write_volatile(val) }
}

/// Activities run in their own address space, which is directly accessible
pub fn local_addr(virt: usize) -> usize {
    virt
}

fn reg_addr(key: RegKey) -> usize {
    MMIO_ADDR + key.index() * core::mem::size_of::<Reg>()
}
