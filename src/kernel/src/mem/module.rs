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

use base::col::String;
use base::mem::GlobOff;
use base::tcu::TileId;

use core::fmt;

/// A boot module that has been placed in the memory tile
pub struct BootModule {
    name: String,
    tile: TileId,
    addr: GlobOff,
    size: GlobOff,
}

impl BootModule {
    pub fn new(name: &str, tile: TileId, addr: GlobOff, size: GlobOff) -> Self {
        BootModule {
            name: String::from(name),
            tile,
            addr,
            size,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tile(&self) -> TileId {
        self.tile
    }

    pub fn addr(&self) -> GlobOff {
        self.addr
    }

    pub fn size(&self) -> GlobOff {
        self.size
    }
}

impl fmt::Debug for BootModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BootModule[name={}, tile={}, addr={:#x}, size={:#x}]",
            self.name, self.tile, self.addr, self.size
        )
    }
}
