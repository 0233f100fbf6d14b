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

use base::col::BTreeMap;
use base::errors::{Code, Error};
use base::mem::GlobOff;
use base::util::math;

use core::fmt;

/// The memory map, allowing allocs and frees of memory areas
///
/// The free areas are kept sorted by address and adjacent areas are merged on free.
pub struct MemMap {
    // address -> size
    areas: BTreeMap<GlobOff, GlobOff>,
}

impl MemMap {
    /// Creates a new memory map from `addr` to `addr`+`size`.
    pub fn new(addr: GlobOff, size: GlobOff) -> Self {
        let mut areas = BTreeMap::new();
        if size > 0 {
            areas.insert(addr, size);
        }
        MemMap { areas }
    }

    /// Allocates a region of `size` bytes, aligned by `align`.
    pub fn allocate(&mut self, size: GlobOff, align: GlobOff) -> Result<GlobOff, Error> {
        let (addr, asize, diff) = self
            .areas
            .iter()
            .map(|(a, s)| (*a, *s, math::round_up(*a, align) - *a))
            .find(|(_, s, diff)| *s > *diff && *s - *diff >= size)
            .ok_or_else(|| Error::new(Code::OutOfMem))?;

        self.areas.remove(&addr);
        // keep the space in front for alignment
        if diff > 0 {
            self.areas.insert(addr, diff);
        }
        let res = addr + diff;
        let rem = asize - diff - size;
        if rem > 0 {
            self.areas.insert(res + size, rem);
        }
        Ok(res)
    }

    /// Free's the given memory region defined by `addr` and `size`.
    pub fn free(&mut self, addr: GlobOff, size: GlobOff) {
        let mut start = addr;
        let mut total = size;

        // merge with prev
        if let Some((paddr, psize)) = self.areas.range(..addr).next_back().map(|(a, s)| (*a, *s)) {
            if paddr + psize == addr {
                self.areas.remove(&paddr);
                start = paddr;
                total += psize;
            }
        }
        // merge with next
        if let Some(nsize) = self.areas.get(&(addr + size)).copied() {
            self.areas.remove(&(addr + size));
            total += nsize;
        }

        self.areas.insert(start, total);
    }

    /// Returns the size of the largest contiguous free space
    pub fn largest_contiguous(&self) -> Option<GlobOff> {
        self.areas.values().max().copied()
    }

    /// Returns a pair of the remaining space and the number of areas.
    pub fn size(&self) -> (GlobOff, usize) {
        (self.areas.values().sum(), self.areas.len())
    }
}

impl fmt::Debug for MemMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[")?;
        for (a, s) in &self.areas {
            writeln!(f, "    Area[addr={:#x}, size={:#x}]", a, s)?;
        }
        write!(f, "  ]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_merge() {
        let mut map = MemMap::new(0x1000, 0x4000);
        let a = map.allocate(0x1000, 0x1000).unwrap();
        let b = map.allocate(0x800, 0x1000).unwrap();
        let c = map.allocate(0x1000, 0x1000).unwrap();
        assert_eq!((a, b, c), (0x1000, 0x2000, 0x3000));
        assert_eq!(map.size(), (0x1800, 2));

        map.free(b, 0x800);
        map.free(a, 0x1000);
        assert_eq!(map.size(), (0x3000, 2));
        map.free(c, 0x1000);
        assert_eq!(map.size(), (0x4000, 1));
        assert_eq!(map.largest_contiguous(), Some(0x4000));
    }

    #[test]
    fn exhaustion() {
        let mut map = MemMap::new(0, 0x2000);
        assert!(map.allocate(0x2000, 1).is_ok());
        assert_eq!(map.allocate(1, 1).err(), Some(Error::new(Code::OutOfMem)));
        assert_eq!(map.largest_contiguous(), None);
    }
}
