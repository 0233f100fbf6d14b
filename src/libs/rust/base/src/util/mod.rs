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

//! Helpers that do not fit elsewhere

pub mod math;

use core::slice;

use crate::mem;

/// Views `obj` as its raw bytes
pub fn object_to_bytes<T: Sized>(obj: &T) -> &[u8] {
    // safety: every T is readable as size_of::<T>() bytes
    unsafe { slice::from_raw_parts(obj as *const T as *const u8, mem::size_of::<T>()) }
}

/// Views `obj` as its raw bytes for writing
///
/// Only use this for plain-data types that are valid for every bit pattern.
pub fn object_to_bytes_mut<T: Sized>(obj: &mut T) -> &mut [u8] {
    // safety: see above; the caller guarantees that T has no invalid bit patterns
    unsafe { slice::from_raw_parts_mut(obj as *mut T as *mut u8, mem::size_of::<T>()) }
}
