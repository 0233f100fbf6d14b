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

use bitflags::bitflags;
use core::fmt;

use num_enum::{FromPrimitive, IntoPrimitive};

use crate::cfg;
use crate::serialize::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, FromPrimitive)]
#[repr(u64)]
/// The different types of tiles
pub enum TileType {
    /// Compute tile
    #[default]
    Comp,
    /// Memory tile
    Mem,
}

/// The supported instruction set architectures (ISAs)
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, FromPrimitive)]
#[repr(u64)]
pub enum TileISA {
    /// Dummy ISA to represent memory tiles
    #[default]
    None,
    /// RISCV as supported on hw
    RISCV,
    /// x86_64, which is used for the host platform
    X86,
    /// ARMv7
    ARM,
}

bitflags! {
    /// The attributes for tiles
    ///
    /// These attributes cover smaller differences between tiles and allow us to choose between
    /// otherwise identical tiles.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TileAttr : TileDescRaw {
        /// Contains a BOOM core
        const BOOM          = 1 << 0;
        /// Contains a Rocket core
        const ROCKET        = 1 << 1;
        /// Contains a serial line
        const SERIAL        = 1 << 3;
        /// Contains internal memory (for memory tiles or SPM in compute tiles)
        const IMEM          = 1 << 4;
    }
}

/// The underlying type of [`TileDesc`]
///
/// +---------------------------+------------+-----+------+
/// | memory size (in 4K pages) | attributes | ISA | type |
/// +---------------------------+------------+-----+------+
/// 64                         28           11     6      0
pub type TileDescRaw = u64;

/// Describes a tile.
///
/// This struct is used by the kernel and the resource manager to select tiles for new activities.
/// Additionally, it tells an activity about the attributes of the tile it has been assigned to.
#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileDesc {
    val: TileDescRaw,
}

impl TileDesc {
    /// Creates a new tile description from the given type, ISA, and memory size.
    pub const fn new(ty: TileType, isa: TileISA, memsize: usize) -> TileDesc {
        Self::new_with_attr(ty, isa, memsize, TileAttr::empty())
    }

    /// Creates a new tile description from the given type, ISA, memory size, and attributes.
    pub const fn new_with_attr(
        ty: TileType,
        isa: TileISA,
        memsize: usize,
        attr: TileAttr,
    ) -> TileDesc {
        let mem_pages = memsize >> cfg::PAGE_BITS;
        let val = ty as TileDescRaw
            | (isa as TileDescRaw) << 6
            | (attr.bits() << 11)
            | (mem_pages as TileDescRaw) << 28;
        Self::new_from(val)
    }

    /// Creates a new tile description from the given raw value
    pub const fn new_from(val: TileDescRaw) -> TileDesc {
        TileDesc { val }
    }

    /// Returns the raw value
    pub fn value(self) -> TileDescRaw {
        self.val
    }

    pub fn tile_type(self) -> TileType {
        TileType::from(self.val & 0x3F)
    }

    pub fn isa(self) -> TileISA {
        TileISA::from((self.val >> 6) & 0x1F)
    }

    pub fn attr(self) -> TileAttr {
        TileAttr::from_bits_truncate((self.val >> 11) & 0x1FFFF)
    }

    /// Returns the size of the internal memory (0 if none is present)
    pub fn mem_size(self) -> usize {
        ((self.val >> 28) as usize) << cfg::PAGE_BITS
    }

    /// Returns whether the tile executes software
    pub fn is_programmable(self) -> bool {
        matches!(self.isa(), TileISA::X86 | TileISA::ARM | TileISA::RISCV)
    }

    /// Return if the tile supports activities
    pub fn supports_activities(self) -> bool {
        self.tile_type() != TileType::Mem
    }

    /// Returns whether the tile has an internal memory (SPM, DRAM, ...)
    pub fn has_memory(self) -> bool {
        self.tile_type() == TileType::Mem || self.attr().contains(TileAttr::IMEM)
    }

    /// Returns whether the tile supports virtual memory
    pub fn has_virtmem(self) -> bool {
        !self.has_memory()
    }

    /// Derives a new TileDesc from this by changing it based on the given properties.
    ///
    /// The properties are separated by `+` (e.g., `riscv+rocket`). Unknown properties are
    /// ignored.
    pub fn with_properties(&self, props: &str) -> TileDesc {
        let mut res = *self;
        for prop in props.split('+') {
            let (isa, attr) = match prop {
                "arm" => (TileISA::ARM, TileAttr::empty()),
                "x86" => (TileISA::X86, TileAttr::empty()),
                "riscv" => (TileISA::RISCV, TileAttr::empty()),
                "rocket" => (res.isa(), TileAttr::ROCKET),
                "boom" => (res.isa(), TileAttr::BOOM),
                "serial" => (res.isa(), TileAttr::SERIAL),
                "imem" => (res.isa(), TileAttr::IMEM),
                _ => continue,
            };
            res = TileDesc::new_with_attr(TileType::Comp, isa, res.mem_size(), res.attr() | attr);
        }
        res
    }

    /// Returns the starting address and size of the standard receive buffer space
    pub fn rbuf_std_space(self) -> (usize, usize) {
        (cfg::RBUF_STD_ADDR, cfg::RBUF_STD_SIZE)
    }

    /// Returns the starting address and size of the receive buffer space
    pub fn rbuf_space(self) -> (usize, usize) {
        (cfg::RBUF_ADDR, cfg::RBUF_SIZE)
    }

    /// Returns the highest address of the stack
    pub fn stack_top(self) -> usize {
        let (addr, size) = self.stack_space();
        addr + size
    }

    /// Returns the starting address and size of the stack
    pub fn stack_space(self) -> (usize, usize) {
        (cfg::STACK_TOP - cfg::STACK_SIZE, cfg::STACK_SIZE)
    }
}

impl fmt::Debug for TileDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TileDesc[type={:?}, isa={:?}, memsz={}, attr={:?}]",
            self.tile_type(),
            self.isa(),
            self.mem_size(),
            self.attr(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields() {
        let desc = TileDesc::new_with_attr(TileType::Comp, TileISA::X86, 0x10_0000, TileAttr::IMEM);
        assert_eq!(desc.tile_type(), TileType::Comp);
        assert_eq!(desc.isa(), TileISA::X86);
        assert_eq!(desc.mem_size(), 0x10_0000);
        assert!(desc.is_programmable());
        assert!(desc.has_memory());
        assert!(!desc.has_virtmem());

        let mem = TileDesc::new(TileType::Mem, TileISA::None, 0x400_0000);
        assert!(!mem.supports_activities());
        assert!(!mem.is_programmable());
        assert_eq!(TileDesc::new_from(mem.value()), mem);
    }

    #[test]
    fn properties() {
        let desc = TileDesc::new(TileType::Comp, TileISA::X86, 0);
        let derived = desc.with_properties("riscv+rocket+foo");
        assert_eq!(derived.isa(), TileISA::RISCV);
        assert!(derived.attr().contains(TileAttr::ROCKET));
        assert!(derived.has_virtmem());
    }
}
