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

//! Contains the platform configuration

pub const MAX_TILES: usize = 64;
pub const MAX_ACTS: usize = 64;

pub const PAGE_BITS: usize = 12;
pub const PAGE_SIZE: usize = 1 << PAGE_BITS;
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// The maximum number of bytes a single READ/WRITE command transfers
pub const MAX_PKT_SIZE: usize = PAGE_SIZE;

/// The start of the environment in the address space of each activity
pub const ENV_START: usize = 0x10_0000;
pub const ENV_SIZE: usize = 2 * PAGE_SIZE;

/// The area for the receive buffers of the standard receive gates
pub const RBUF_STD_ADDR: usize = ENV_START + ENV_SIZE;
pub const RBUF_STD_SIZE: usize = PAGE_SIZE;
/// The area for all other receive buffers
pub const RBUF_ADDR: usize = RBUF_STD_ADDR + RBUF_STD_SIZE;
pub const RBUF_SIZE: usize = 16 * PAGE_SIZE;

/// The size of the memory region of each activity that is reachable via TCU
pub const ACT_REGION_SIZE: usize = ENV_SIZE + RBUF_STD_SIZE + RBUF_SIZE;

/// The maximum number of slots in a receive buffer
pub const MAX_RB_SLOTS: usize = 32;
/// The maximum size of the activity-local data that is passed to childs
pub const MAX_DATA_SIZE: usize = 256;

pub const SYSC_RBUF_ORD: u32 = 9;
pub const UPCALL_RBUF_ORD: u32 = 8;
pub const UPCALL_RBUF_MSG_ORD: u32 = 6;
pub const DEF_RBUF_ORD: u32 = 10;
pub const DEF_RBUF_MSG_ORD: u32 = 8;

pub const SYSC_RBUF_SIZE: usize = 1 << SYSC_RBUF_ORD;
pub const UPCALL_RBUF_SIZE: usize = 1 << UPCALL_RBUF_ORD;
pub const DEF_RBUF_SIZE: usize = 1 << DEF_RBUF_ORD;

pub const APP_HEAP_SIZE: usize = 64 * 1024 * 1024;
pub const MOD_HEAP_SIZE: usize = 16 * 1024 * 1024;
pub const STACK_SIZE: usize = 0x10000;
pub const STACK_TOP: usize = 0x0800_0000;

pub const FIXED_KMEM: usize = 2 * 1024 * 1024;
