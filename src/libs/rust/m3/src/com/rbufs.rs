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

use core::fmt;

use crate::col::Vec;
use crate::errors::{Code, Error};
use crate::util::math;

/// The allocator for receive buffers
///
/// Receive buffers are placed in the receive-buffer space of the tile. Buffers are aligned to
/// their size, so that the message slots stay naturally aligned.
pub struct RecvBufs {
    free: Vec<(usize, usize)>,
}

impl RecvBufs {
    /// Creates a new allocator for the region `addr`..`addr`+`size`
    pub fn new(addr: usize, size: usize) -> Self {
        let mut free = Vec::new();
        if size > 0 {
            free.push((addr, size));
        }
        Self { free }
    }

    /// Allocates a buffer of `size` bytes and returns its address
    pub fn alloc(&mut self, size: usize) -> Result<usize, Error> {
        let align = size.next_power_of_two();
        for i in 0..self.free.len() {
            let (addr, len) = self.free[i];
            let start = math::round_up(addr, align);
            let end = addr + len;
            if start >= end || end - start < size {
                continue;
            }

            self.free.remove(i);
            if start > addr {
                self.insert(addr, start - addr);
            }
            if start + size < end {
                self.insert(start + size, end - (start + size));
            }
            return Ok(start);
        }
        Err(Error::new(Code::NoSpace))
    }

    /// Frees the buffer at `addr` with `size` bytes
    pub fn free(&mut self, addr: usize, size: usize) {
        self.insert(addr, size);
    }

    /// Returns the number of free bytes
    pub fn free_space(&self) -> usize {
        self.free.iter().map(|(_, len)| len).sum()
    }

    fn insert(&mut self, addr: usize, size: usize) {
        let pos = self
            .free
            .iter()
            .position(|(a, _)| *a > addr)
            .unwrap_or(self.free.len());
        self.free.insert(pos, (addr, size));

        // merge with the successor
        if pos + 1 < self.free.len() && addr + size == self.free[pos + 1].0 {
            self.free[pos].1 += self.free[pos + 1].1;
            self.free.remove(pos + 1);
        }
        // merge with the predecessor
        if pos > 0 && self.free[pos - 1].0 + self.free[pos - 1].1 == addr {
            self.free[pos - 1].1 += self.free[pos].1;
            self.free.remove(pos);
        }
    }
}

impl fmt::Debug for RecvBufs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecvBufs[")?;
        for (addr, size) in &self.free {
            write!(f, " {:#x}..{:#x}", addr, addr + size)?;
        }
        write!(f, " ]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_allocs() {
        let mut bufs = RecvBufs::new(0x1000, 0x1000);
        assert_eq!(bufs.alloc(0x100), Ok(0x1000));
        assert_eq!(bufs.alloc(0x40), Ok(0x1100));
        // the next 0x200 buffer needs to be aligned to its size
        assert_eq!(bufs.alloc(0x200), Ok(0x1200));
        assert_eq!(bufs.free_space(), 0x1000 - 0x340);
    }

    #[test]
    fn exhausted() {
        let mut bufs = RecvBufs::new(0x1000, 0x400);
        assert_eq!(bufs.alloc(0x400), Ok(0x1000));
        assert_eq!(bufs.alloc(0x40).err().map(|e| e.code()), Some(Code::NoSpace));
    }

    #[test]
    fn free_merges() {
        let mut bufs = RecvBufs::new(0x1000, 0x1000);
        let a = bufs.alloc(0x400).unwrap();
        let b = bufs.alloc(0x400).unwrap();
        let c = bufs.alloc(0x800).unwrap();
        assert_eq!(bufs.free_space(), 0);

        bufs.free(b, 0x400);
        bufs.free(a, 0x400);
        bufs.free(c, 0x800);
        assert_eq!(bufs.free_space(), 0x1000);
        assert_eq!(bufs.alloc(0x1000), Ok(0x1000));
    }
}
