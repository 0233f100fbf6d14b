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

//! Provides access to the environment of an activity
//!
//! The environment is placed at [`ENV_START`](cfg::ENV_START) by the parent of the activity (or
//! the kernel for the root activity). It starts with [`EnvData`], which is followed by the
//! serialized mount table, file table, and activity-local data, and finally the arguments.

use core::iter;
use core::slice;
use core::str;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::arch;
use crate::cfg;

/// The platforms
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum Platform {
    /// The hardware platform with memory-mapped TCUs
    Hw,
    /// The in-process emulation of tiles and TCUs
    Loopback,
}

/// The environment data of an activity
///
/// All addresses are virtual addresses within the address space of the activity.
#[derive(Copy, Clone, Default, Debug)]
#[repr(C)]
pub struct EnvData {
    pub platform: u64,
    pub tile_id: u64,
    pub tile_desc: u64,
    pub argc: u32,
    pub argv: u64,
    pub envp: u64,
    pub heap_size: u64,
    pub sp: u64,
    /// The entry point of the program (on loopback: the runtime's entry function)
    pub entry: u64,
    pub first_std_ep: u16,
    pub first_sel: u64,
    pub act_id: u32,
    pub rmng_sel: u64,
    pub pager_sess: u64,
    pub pager_sgate: u64,
    pub mounts_addr: u64,
    pub mounts_len: u32,
    pub fds_addr: u64,
    pub fds_len: u32,
    pub data_addr: u64,
    pub data_len: u32,
    /// The function to execute instead of the program's main function (0 if none)
    pub lambda: u64,
}

impl EnvData {
    /// Returns the platform, if known
    pub fn platform(&self) -> Option<Platform> {
        Platform::try_from(self.platform).ok()
    }
}

/// Returns the environment data of the current activity
///
/// This may only be called from within an activity, because only activities have an environment.
pub fn get() -> &'static EnvData {
    // safety: the environment has been put there by our parent and lives as long as we do
    unsafe { &*(arch::tcu::local_addr(cfg::ENV_START) as *const EnvData) }
}

/// Returns the bytes of the given region of the environment
///
/// Returns an empty slice for an empty region.
pub fn region(addr: u64, len: u32) -> &'static [u8] {
    if addr == 0 || len == 0 {
        return &[];
    }
    // safety: the parent placed the region within our environment
    unsafe { slice::from_raw_parts(arch::tcu::local_addr(addr as usize) as *const u8, len as usize) }
}

/// Returns the given region of the environment as words
pub fn region_words(addr: u64, len: u32) -> &'static [u64] {
    if addr == 0 || len == 0 {
        return &[];
    }
    // safety: as in region, and the parent places all regions at word-aligned addresses
    unsafe {
        slice::from_raw_parts(
            arch::tcu::local_addr(addr as usize) as *const u64,
            len as usize / 8,
        )
    }
}

// safety: the caller needs to ensure that `addr` points to a null-terminated string in the env
unsafe fn cstr_at(addr: u64) -> &'static str {
    let start = arch::tcu::local_addr(addr as usize) as *const u8;
    let mut len = 0;
    while *start.add(len) != 0 {
        len += 1;
    }
    str::from_utf8(slice::from_raw_parts(start, len)).unwrap_or("")
}

/// The iterator over a null-terminated array of strings in the environment
#[derive(Copy, Clone)]
pub struct Strings {
    array: u64,
    count: Option<usize>,
    pos: usize,
}

impl Strings {
    fn at(&self, idx: usize) -> Option<&'static str> {
        if self.array == 0 {
            return None;
        }
        // safety: the parent placed the array and the strings in our environment
        unsafe {
            let array = arch::tcu::local_addr(self.array as usize) as *const u64;
            match *array.add(idx) {
                0 => None,
                s => Some(cstr_at(s)),
            }
        }
    }
}

impl iter::Iterator for Strings {
    type Item = &'static str;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(cnt) = self.count {
            if self.pos >= cnt {
                return None;
            }
        }
        let s = self.at(self.pos)?;
        self.pos += 1;
        Some(s)
    }
}

/// Returns an iterator over the arguments of the current activity
pub fn args() -> Strings {
    let env = get();
    Strings {
        array: env.argv,
        count: Some(env.argc as usize),
        pos: 0,
    }
}

/// Returns an iterator over the environment variables (`key=value`) of the current activity
pub fn vars() -> Strings {
    Strings {
        array: get().envp,
        count: None,
        pos: 0,
    }
}

/// Returns the value of the environment variable with given key
pub fn var(key: &str) -> Option<&'static str> {
    vars().find_map(|kv| match kv.split_once('=') {
        Some((k, v)) if k == key => Some(v),
        _ => None,
    })
}
