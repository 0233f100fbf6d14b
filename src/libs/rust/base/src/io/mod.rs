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

//! Contains the modules for serial output, logging, etc.

pub mod log;
mod logflags;
mod rdwr;
mod serial;

pub use self::logflags::LogFlags;
pub use self::rdwr::{read_object, Read, Write};
pub use self::serial::Serial;

use crate::tcu::TileId;

/// Macro for logging (includes a trailing newline)
///
/// The arguments are printed if $flag is enabled (see `$crate::io::LogFlags`).
///
/// # Examples
///
/// ```
/// use base::io::LogFlags;
/// use base::log;
///
/// log!(LogFlags::Debug, "my log entry: {}, {}", 1, "test");
/// ```
#[macro_export]
macro_rules! log {
    ($flag:expr, $fmt:expr)                   => (
        $crate::log!(@log_impl $flag, concat!($fmt, "\n"))
    );

    ($flag:expr, $fmt:expr, $($arg:tt)*)      => (
        $crate::log!(@log_impl $flag, concat!($fmt, "\n"), $($arg)*)
    );

    (@log_impl $flag:expr, $($args:tt)*)    => ({
        $crate::io::log::Log::with(|l| {
            if l.flags().contains($flag) {
                #[allow(unused_imports)]
                use $crate::io::Write;
                l.write_fmt(format_args!($($args)*)).ok();
            }
        });
    });
}

/// Initializes the I/O module for the current activity
///
/// The log flags are taken from the `LOG` variable of the environment, if present.
pub fn init(tile_id: TileId, name: &str) {
    log::init(tile_id, name, LogFlags::from_env());
}
