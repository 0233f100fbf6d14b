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

//! Contains tile-related abstractions
//!
//! The platform consists of memory and compute tiles. This module deals with the allocation of
//! compute tiles and the execution of *activities* on these tiles.
//!
//! # Tile allocation
//!
//! Tiles are allocated from the resource manager via [`Tile`]. The TCU of an allocated tile stays
//! under the control of the kernel, so that every access to tile-external resources is checked.
//! The endpoints of a tile can be split by *deriving* a new [`Tile`] object from an existing one.
//!
//! # Activities
//!
//! The own activity is represented by [`OwnActivity`], whereas created activities are represented
//! by [`ChildActivity`]. The former provides access to the resources of the own activity such as
//! the [`EpMng`](`crate::com::EpMng`), the standard gates, and the
//! [`ResMng`](`crate::client::ResMng`). A [`ChildActivity`] is first configured (delegating
//! capabilities, files, mount points, and data to the child) and finally started, which yields a
//! [`RunningActivity`].

mod activity;
mod childactivity;
mod kmem;
mod loader;
mod ownactivity;
mod running;
mod tile;

pub use self::activity::Activity;
pub use self::childactivity::{ActivityArgs, ChildActivity};
pub use self::kmem::KMem;
pub use self::loader::{load_program, read_segments, Segment};
pub use self::ownactivity::OwnActivity;
pub use self::running::{RunningActivity, RunningDeviceActivity, RunningProgramActivity};
pub use self::tile::Tile;

use cfg_if::cfg_if;

use crate::errors::Error;

pub(crate) fn init() -> Result<(), Error> {
    self::activity::init()
}

/// Returns true if the own activity is currently leaving, that is, if it is unwinding its stack
/// on the way out
///
/// Capabilities and endpoints are not given back while leaving, because the kernel revokes all of
/// them after the exit anyway.
pub(crate) fn is_leaving() -> bool {
    cfg_if! {
        if #[cfg(feature = "loopback")] {
            std::thread::panicking()
        }
        else {
            false
        }
    }
}
