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

//! The base library of M³
//!
//! This library contains the definitions and primitives that are shared between the kernel and
//! the user-level runtime: the TCU register interface and its command engine, the message and
//! endpoint model, the kernel interface (KIF), the serializer for IPC messages, the error codes,
//! and the logging infrastructure. With the `loopback` feature, the TCU is emulated in-process and
//! activities are executed as host threads.

#![cfg_attr(not(feature = "loopback"), no_std)]

extern crate alloc;
pub extern crate core as _core;

// Macros
pub use alloc::{format, vec};
pub use static_assertions::const_assert;

/// Pointer types for heap allocation
pub mod boxed {
    pub use alloc::boxed::Box;
}

/// Single-threaded reference-counting pointers
pub mod rc {
    pub use alloc::rc::{Rc, Weak};
}

/// Thread-safe reference-counting pointers
#[cfg(target_has_atomic = "ptr")]
pub mod sync {
    pub use alloc::sync::{Arc, Weak};
}

/// Types to work with borrowed data
pub mod borrow {
    pub use alloc::borrow::{Borrow, BorrowMut, Cow, ToOwned};
}

/// Collection types
pub mod col {
    pub use alloc::collections::{BTreeMap, BTreeSet, VecDeque};
    pub use alloc::string::{String, ToString};
    pub use alloc::vec::Vec;
}

#[macro_use]
pub mod util;
#[macro_use]
pub mod cell;
#[macro_use]
pub mod io;
#[macro_use]
pub mod serialize;

mod arch;

pub mod cfg;
pub mod elf;
pub mod env;
pub mod errors;
pub mod kif;
pub mod mem;
pub mod quota;
pub mod tcu;
pub mod time;
pub mod tmif;

pub use serde;

/// The in-process platform that emulates tiles, TCUs, and TileMux
#[cfg(feature = "loopback")]
pub use arch::loopback;
