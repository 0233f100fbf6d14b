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

use base::cell::RefCell;
use base::errors::Error;
use base::io::LogFlags;
use base::log;
use base::mem::GlobOff;
use base::rc::Rc;
use base::tcu::TileId;

use core::fmt;

use crate::mem::MemMap;

struct MemPool {
    tile: TileId,
    map: RefCell<MemMap>,
}

/// A region of main memory that is freed on drop
pub struct Allocation {
    pool: Rc<MemPool>,
    addr: GlobOff,
    size: GlobOff,
}

impl Allocation {
    pub fn tile(&self) -> TileId {
        self.pool.tile
    }

    pub fn addr(&self) -> GlobOff {
        self.addr
    }

    pub fn size(&self) -> GlobOff {
        self.size
    }
}

impl fmt::Debug for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Alloc[tile={}, addr={:#x}, size={:#x}]",
            self.pool.tile, self.addr, self.size
        )
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        log!(LogFlags::KernMem, "Freed {:?}", self);
        self.pool.map.borrow_mut().free(self.addr, self.size);
    }
}

/// The user memory of the memory tile
pub struct MainMemory {
    pool: Rc<MemPool>,
    capacity: GlobOff,
}

impl MainMemory {
    pub fn new(tile: TileId, addr: GlobOff, size: GlobOff) -> Self {
        Self {
            pool: Rc::new(MemPool {
                tile,
                map: RefCell::new(MemMap::new(addr, size)),
            }),
            capacity: size,
        }
    }

    pub fn tile(&self) -> TileId {
        self.pool.tile
    }

    pub fn allocate(&self, size: GlobOff, align: GlobOff) -> Result<Allocation, Error> {
        let addr = self.pool.map.borrow_mut().allocate(size, align)?;
        let alloc = Allocation {
            pool: self.pool.clone(),
            addr,
            size,
        };
        log!(LogFlags::KernMem, "Allocated {:?}", alloc);
        Ok(alloc)
    }

    pub fn capacity(&self) -> GlobOff {
        self.capacity
    }

    pub fn available(&self) -> GlobOff {
        self.pool.map.borrow().size().0
    }
}

impl fmt::Debug for MainMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MainMemory[tile={}, size: {} KiB, available: {} KiB, map: {:?}]",
            self.pool.tile,
            self.capacity / 1024,
            self.available() / 1024,
            self.pool.map.borrow()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freed_on_drop() {
        let mem = MainMemory::new(TileId::new(0, 3), 0x10000, 0x8000);
        let a = mem.allocate(0x1000, 0x1000).unwrap();
        assert_eq!(a.tile(), TileId::new(0, 3));
        assert_eq!(a.addr(), 0x10000);
        assert_eq!(mem.available(), 0x7000);

        {
            let _b = mem.allocate(0x7000, 1).unwrap();
            assert_eq!(mem.available(), 0);
            assert!(mem.allocate(1, 1).is_err());
        }
        assert_eq!(mem.available(), 0x7000);
        drop(a);
        assert_eq!(mem.available(), mem.capacity());
    }
}
