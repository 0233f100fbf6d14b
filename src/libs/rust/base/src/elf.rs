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

//! Contains the basics of the ELF interface
//!
//! Only 64-bit little-endian ELF files are supported.

use bitflags::bitflags;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::errors::{Code, Error};
use crate::kif;
use crate::mem;
use crate::util;

const EI_NIDENT: usize = 16;

/// The ELF magic
pub const MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

/// The program header entry types
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum PHType {
    /// Unused entry
    #[default]
    Null = 0,
    /// Load segment
    Load = 1,
}

bitflags! {
    /// The program header flags
    #[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
    pub struct PHFlags : u32 {
        /// Executable
        const X = 0x1;
        /// Writable
        const W = 0x2;
        /// Readable
        const R = 0x4;
    }
}

/// ELF header
#[derive(Copy, Clone, Default, Debug)]
#[repr(C)]
pub struct ElfHeader {
    /// ELF magic: ['\x7F', 'E', 'L', 'F']
    pub ident: [u8; EI_NIDENT],
    /// ELF type (e.g., executable)
    pub ty: u16,
    /// Machine the ELF binary was built for
    pub machine: u16,
    /// ELF version
    pub version: u32,
    /// Entry point of the program
    pub entry: u64,
    /// Program header offset
    pub ph_off: u64,
    /// Section header offset
    pub sh_off: u64,
    /// ELF flags
    pub flags: u32,
    /// Size of the ELF header
    pub eh_size: u16,
    /// Size of program headers
    pub ph_entry_size: u16,
    /// Number of program headers
    pub ph_num: u16,
    /// Size of section headers
    pub sh_entry_size: u16,
    /// Number of section headers
    pub sh_num: u16,
    /// Section header string table index
    pub sh_string_idx: u16,
}
const _: () = assert!(mem::size_of::<ElfHeader>() == 64);

impl ElfHeader {
    /// Reads the ELF header from the beginning of `bytes`
    ///
    /// # Errors
    ///
    /// Fails with [`InvalidElf`](Code::InvalidElf) if `bytes` are too short or do not start with
    /// the ELF magic.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut hdr = Self::default();
        if bytes.len() < mem::size_of::<Self>() {
            return Err(Error::new(Code::InvalidElf));
        }
        util::object_to_bytes_mut(&mut hdr).copy_from_slice(&bytes[0..mem::size_of::<Self>()]);
        hdr.check()?;
        Ok(hdr)
    }

    /// Checks the magic and the program header size
    pub fn check(&self) -> Result<(), Error> {
        if self.ident[0..4] != MAGIC
            || self.ph_entry_size as usize != mem::size_of::<ProgramHeader>()
        {
            return Err(Error::new(Code::InvalidElf));
        }
        Ok(())
    }

    /// Returns the file offset of the program header with given index
    pub fn ph_offset(&self, idx: usize) -> u64 {
        self.ph_off + (idx * self.ph_entry_size as usize) as u64
    }
}

/// Program header
#[derive(Copy, Clone, Default, Debug)]
#[repr(C)]
pub struct ProgramHeader {
    /// Program header type
    pub ty: u32,
    /// Program header flags
    pub flags: u32,
    /// File offset
    pub offset: u64,
    /// Virtual address
    pub virt_addr: u64,
    /// Physical address
    pub phys_addr: u64,
    /// Size of this program header in the file
    pub file_size: u64,
    /// Size of this program header in memory
    pub mem_size: u64,
    /// Alignment
    pub align: u64,
}
const _: () = assert!(mem::size_of::<ProgramHeader>() == 56);

impl ProgramHeader {
    /// Reads the program header from the beginning of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut ph = Self::default();
        if bytes.len() < mem::size_of::<Self>() {
            return Err(Error::new(Code::InvalidElf));
        }
        util::object_to_bytes_mut(&mut ph).copy_from_slice(&bytes[0..mem::size_of::<Self>()]);
        Ok(ph)
    }

    /// Returns true if this is a loadable segment
    pub fn is_load(&self) -> bool {
        PHType::try_from(self.ty) == Ok(PHType::Load)
    }

    /// Returns the permissions of the segment
    pub fn perm(&self) -> kif::Perm {
        kif::Perm::from(PHFlags::from_bits_truncate(self.flags))
    }
}

impl From<PHFlags> for kif::Perm {
    fn from(flags: PHFlags) -> Self {
        let mut prot = kif::Perm::empty();
        if flags.contains(PHFlags::R) {
            prot |= kif::Perm::R;
        }
        if flags.contains(PHFlags::W) {
            prot |= kif::Perm::W;
        }
        if flags.contains(PHFlags::X) {
            prot |= kif::Perm::X;
        }
        prot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::col::Vec;

    fn header() -> ElfHeader {
        let mut hdr = ElfHeader::default();
        hdr.ident[0..4].copy_from_slice(&MAGIC);
        hdr.ph_off = 64;
        hdr.ph_entry_size = 56;
        hdr.ph_num = 1;
        hdr.entry = 0x1000;
        hdr
    }

    #[test]
    fn parse() {
        let ph = ProgramHeader {
            ty: PHType::Load.into(),
            flags: (PHFlags::R | PHFlags::X).bits(),
            virt_addr: 0x1000,
            file_size: 16,
            mem_size: 32,
            ..Default::default()
        };
        let mut bytes = Vec::new();
        bytes.extend_from_slice(util::object_to_bytes(&header()));
        bytes.extend_from_slice(util::object_to_bytes(&ph));

        let hdr = ElfHeader::from_bytes(&bytes).unwrap();
        assert_eq!(hdr.entry, 0x1000);
        let off = hdr.ph_offset(0) as usize;
        let ph = ProgramHeader::from_bytes(&bytes[off..]).unwrap();
        assert!(ph.is_load());
        assert_eq!(ph.perm(), kif::Perm::R | kif::Perm::X);
    }

    #[test]
    fn bad_magic() {
        let mut hdr = header();
        hdr.ident[1] = b'X';
        assert_eq!(
            ElfHeader::from_bytes(util::object_to_bytes(&hdr)).map(|_| ()).map_err(|e| e.code()),
            Err(Code::InvalidElf)
        );
        assert_eq!(
            ElfHeader::from_bytes(&[0x7F, b'E']).map(|_| ()).map_err(|e| e.code()),
            Err(Code::InvalidElf)
        );
    }
}
