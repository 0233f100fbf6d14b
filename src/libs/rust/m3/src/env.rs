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

//! Contains the environment of activities and the entry point of the runtime
//!
//! The environment is written by the parent into the memory of the child at
//! [`ENV_START`](cfg::ENV_START) before the child is started. It consists of [`EnvData`] followed
//! by the serialized file table, mount table, activity-local data, and the arguments and
//! variables. [`EnvBuilder`] lays out everything behind [`EnvData`].

use core::mem;

use crate::cfg;
use crate::col::Vec;
use crate::errors::{Code, Error};
use crate::io;
use crate::tcu::TileId;
use crate::tiles::{self, OwnActivity};
use crate::util::math;

pub use base::env::{args, get, region, region_words, var, vars, EnvData, Platform, Strings};

/// The function type that activities can be started with
pub type Lambda = fn() -> Result<(), Error>;

/// The entry point of the runtime
///
/// Initializes logging and the own activity from the environment, calls the function selected by
/// the parent (see [`ChildActivity::run`](crate::tiles::ChildActivity::run)), and exits with its
/// result. Without function, the activity exits with [`NotSup`](Code::NotSup).
pub fn env_run() {
    let env = get();
    io::init(
        TileId::new_from_raw(env.tile_id as u16),
        args().next().unwrap_or("Unknown"),
    );

    let res = tiles::init().and_then(|_| {
        io::init_std();
        match env.lambda {
            0 => Err(Error::new(Code::NotSup)),
            addr => {
                // safety: the parent has set the lambda to a function of our own program
                let func: Lambda = unsafe { mem::transmute(addr as usize) };
                func()
            },
        }
    });
    OwnActivity::exit(res);
}

/// Lays out the regions behind [`EnvData`]
///
/// All regions are placed at word-aligned addresses and addressed by their virtual address within
/// the child's address space.
pub(crate) struct EnvBuilder {
    start: usize,
    bytes: Vec<u8>,
}

impl EnvBuilder {
    pub fn new() -> Self {
        EnvBuilder {
            start: math::round_up(cfg::ENV_START + mem::size_of::<EnvData>(), 8),
            bytes: Vec::new(),
        }
    }

    /// Returns the address of the first region
    pub fn start(&self) -> usize {
        self.start
    }

    /// Returns the bytes of all regions
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn addr(&self) -> usize {
        self.start + self.bytes.len()
    }

    fn align(&mut self) {
        let len = math::round_up(self.bytes.len(), 8);
        self.bytes.resize(len, 0);
    }

    /// Appends the given words and returns their address and length in bytes
    pub fn push_words(&mut self, words: &[u64]) -> (u64, u32) {
        if words.is_empty() {
            return (0, 0);
        }
        let addr = self.addr();
        for w in words {
            self.bytes.extend_from_slice(&w.to_le_bytes());
        }
        (addr as u64, (words.len() * 8) as u32)
    }

    /// Appends the null-terminated array of string pointers and the strings and returns the address
    /// of the array
    pub fn push_strings<S, I>(&mut self, strings: I) -> u64
    where
        S: AsRef<str>,
        I: Iterator<Item = S> + Clone,
    {
        let count = strings.clone().count();
        let array = self.addr();
        let mut str_addr = array + (count + 1) * 8;

        let mut ptrs = Vec::with_capacity(count + 1);
        for s in strings.clone() {
            ptrs.push(str_addr as u64);
            str_addr += s.as_ref().len() + 1;
        }
        ptrs.push(0);
        self.push_words(&ptrs);

        for s in strings {
            self.bytes.extend_from_slice(s.as_ref().as_bytes());
            self.bytes.push(0);
        }
        self.align();
        array as u64
    }

    /// Checks whether all regions fit into the environment
    pub fn check(&self) -> Result<(), Error> {
        if self.addr() > cfg::ENV_START + cfg::ENV_SIZE {
            return Err(Error::new(Code::NoSpace));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let mut b = EnvBuilder::new();
        let start = b.start();
        assert_eq!(start % 8, 0);
        assert_eq!(b.push_words(&[]), (0, 0));
        assert_eq!(b.push_words(&[1, 2]), (start as u64, 16));

        let argv = b.push_strings(["cat", "/test.txt"].iter());
        assert_eq!(argv, start as u64 + 16);
        // array of 3 pointers, "cat\0", "/test.txt\0", padding
        assert_eq!(b.bytes().len(), 16 + 24 + 16);

        let first = u64::from_le_bytes(b.bytes()[16..24].try_into().unwrap());
        assert_eq!(first, argv + 24);
        let off = (first - start as u64) as usize;
        assert_eq!(&b.bytes()[off..off + 4], b"cat\0");
        let null = u64::from_le_bytes(b.bytes()[32..40].try_into().unwrap());
        assert_eq!(null, 0);
        assert!(b.check().is_ok());
    }

    #[test]
    fn overflow() {
        let mut b = EnvBuilder::new();
        b.push_words(&vec![0u64; cfg::ENV_SIZE / 8]);
        assert_eq!(b.check().unwrap_err().code(), Code::NoSpace);
    }
}
