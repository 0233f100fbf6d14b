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

//! Contains cell types for per-activity state
//!
//! On hardware, each activity runs alone in its address space, so that per-activity state can be
//! kept in statics. On the loopback platform, all activities share the host process and run on
//! separate threads, so that the same state needs to live in thread-local storage. The
//! [`activity_local!`](crate::activity_local) macro hides this difference.

pub use core::cell::{Cell, Ref, RefCell, RefMut, UnsafeCell};

use core::fmt;

/// A cell for a static object that belongs to the current activity
///
/// This type is used by [`activity_local!`](crate::activity_local) on platforms where each
/// activity has its own address space and is single threaded.
pub struct ActivityLocal<T> {
    inner: T,
}

// safety: on these platforms, an activity's address space is never accessed by multiple threads
unsafe impl<T> Sync for ActivityLocal<T> {
}

impl<T> ActivityLocal<T> {
    /// Creates a new cell with given value
    pub const fn new(val: T) -> Self {
        Self { inner: val }
    }

    /// Calls `func` with a reference to the inner value
    pub fn with<R, F: FnOnce(&T) -> R>(&'static self, func: F) -> R {
        func(&self.inner)
    }
}

impl<T: fmt::Debug> fmt::Debug for ActivityLocal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

/// Declares static objects that are local to the current activity
///
/// The objects are accessed via `with`, which passes a reference to the object to the given
/// closure:
///
/// ```
/// use base::activity_local;
/// use base::cell::Cell;
///
/// activity_local! {
///     static COUNTER: Cell<u32> = Cell::new(0);
/// }
///
/// COUNTER.with(|c| c.set(c.get() + 1));
/// assert_eq!(COUNTER.with(|c| c.get()), 1);
/// ```
#[macro_export]
macro_rules! activity_local {
    ($($(#[$attr:meta])* $vis:vis static $name:ident: $t:ty = $init:expr;)+) => {
        $(
            $crate::__activity_local_impl!($(#[$attr])* $vis $name, $t, $init);
        )+
    };
}

#[cfg(feature = "loopback")]
#[doc(hidden)]
#[macro_export]
macro_rules! __activity_local_impl {
    ($(#[$attr:meta])* $vis:vis $name:ident, $t:ty, $init:expr) => {
        std::thread_local! {
            $(#[$attr])* $vis static $name: $t = $init;
        }
    };
}

#[cfg(not(feature = "loopback"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __activity_local_impl {
    ($(#[$attr:meta])* $vis:vis $name:ident, $t:ty, $init:expr) => {
        $(#[$attr])* $vis static $name: $crate::cell::ActivityLocal<$t> =
            $crate::cell::ActivityLocal::new($init);
    };
}
