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

//! Loads ELF programs into the address space of activities

use crate::cfg;
use crate::col::Vec;
use crate::elf::{ElfHeader, ProgramHeader};
use crate::errors::Error;
use crate::io::{LogFlags, Read};
use crate::kif::Perm;
use crate::log;
use crate::mem::{size_of, GlobOff};
use crate::tiles::Activity;
use crate::vec;
use crate::vfs::{Seek, SeekMode};

/// A loadable segment of a program
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Segment {
    /// The offset of the segment's content within the file
    pub offset: usize,
    /// The virtual address to load the segment to
    pub virt: GlobOff,
    /// The number of bytes that are taken from the file
    pub file_size: usize,
    /// The size of the segment in memory (the remainder is zeroed)
    pub mem_size: usize,
    /// The permissions of the segment
    pub perm: Perm,
}

impl Segment {
    fn new(ph: &ProgramHeader) -> Self {
        Segment {
            offset: ph.offset as usize,
            virt: ph.virt_addr,
            file_size: ph.file_size as usize,
            mem_size: ph.mem_size as usize,
            perm: ph.perm(),
        }
    }
}

/// Reads the ELF header from `file` and returns it together with all loadable segments
///
/// Fails with [`InvalidElf`](crate::errors::Code::InvalidElf) if the file is no valid ELF file.
pub fn read_segments<F>(file: &mut F) -> Result<(ElfHeader, Vec<Segment>), Error>
where
    F: Read + Seek,
{
    let mut buf = [0u8; size_of::<ElfHeader>()];
    file.seek(0, SeekMode::Set)?;
    file.read_exact(&mut buf)?;
    let hdr = ElfHeader::from_bytes(&buf)?;

    let mut segs = Vec::new();
    let mut phbuf = [0u8; size_of::<ProgramHeader>()];
    for i in 0..hdr.ph_num as usize {
        file.seek(hdr.ph_offset(i) as usize, SeekMode::Set)?;
        file.read_exact(&mut phbuf)?;
        let ph = ProgramHeader::from_bytes(&phbuf)?;
        // empty segments have nothing to load
        if ph.is_load() && ph.mem_size > 0 {
            segs.push(Segment::new(&ph));
        }
    }
    Ok((hdr, segs))
}

/// Loads the program in `file` into the address space of `act` and returns its entry point
///
/// The segments are written via [`MemGate`](crate::com::MemGate)s onto the activity's memory,
/// which requires that the activity has not been started yet. Memory behind the file content of a
/// segment is zeroed.
pub fn load_program<F>(act: &Activity, file: &mut F) -> Result<GlobOff, Error>
where
    F: Read + Seek,
{
    let (hdr, segs) = read_segments(file)?;

    let mut buf = vec![0u8; cfg::MAX_PKT_SIZE];
    for seg in &segs {
        log!(
            LogFlags::LibFS,
            "Loading segment {:#x}..{:#x} ({:?}) from offset {:#x}",
            seg.virt,
            seg.virt + seg.mem_size as GlobOff,
            seg.perm,
            seg.offset
        );

        let mem = act.get_mem(seg.virt, seg.mem_size as GlobOff, Perm::W)?;

        file.seek(seg.offset, SeekMode::Set)?;
        let mut off = 0;
        while off < seg.file_size {
            let amount = (seg.file_size - off).min(buf.len());
            file.read_exact(&mut buf[0..amount])?;
            mem.write(&buf[0..amount], off as GlobOff)?;
            off += amount;
        }

        buf.fill(0);
        while off < seg.mem_size {
            let amount = (seg.mem_size - off).min(buf.len());
            mem.write(&buf[0..amount], off as GlobOff)?;
            off += amount;
        }
    }

    Ok(hdr.entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::elf::{PHFlags, PHType, MAGIC};
    use crate::errors::Code;
    use crate::util;

    struct Bytes {
        data: Vec<u8>,
        pos: usize,
    }

    impl Read for Bytes {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
            let amount = buf.len().min(self.data.len() - self.pos);
            buf[0..amount].copy_from_slice(&self.data[self.pos..self.pos + amount]);
            self.pos += amount;
            Ok(amount)
        }
    }

    impl Seek for Bytes {
        fn seek(&mut self, off: usize, whence: SeekMode) -> Result<usize, Error> {
            self.pos = match whence {
                SeekMode::Set => off,
                SeekMode::Cur => self.pos + off,
                SeekMode::End => self.data.len(),
            }
            .min(self.data.len());
            Ok(self.pos)
        }
    }

    fn program(phs: &[ProgramHeader]) -> Vec<u8> {
        let mut hdr = ElfHeader::default();
        hdr.ident[0..4].copy_from_slice(&MAGIC);
        hdr.entry = 0x1234;
        hdr.ph_off = size_of::<ElfHeader>() as u64;
        hdr.ph_entry_size = size_of::<ProgramHeader>() as u16;
        hdr.ph_num = phs.len() as u16;

        let mut bytes = util::object_to_bytes(&hdr).to_vec();
        for ph in phs {
            bytes.extend_from_slice(util::object_to_bytes(ph));
        }
        bytes
    }

    #[test]
    fn loadable_segments() {
        let text = ProgramHeader {
            ty: PHType::Load.into(),
            flags: (PHFlags::R | PHFlags::X).bits(),
            offset: 0x100,
            virt_addr: 0x2000,
            file_size: 0x80,
            mem_size: 0x80,
            ..Default::default()
        };
        let bss = ProgramHeader {
            ty: PHType::Load.into(),
            flags: (PHFlags::R | PHFlags::W).bits(),
            offset: 0x180,
            virt_addr: 0x3000,
            file_size: 0,
            mem_size: 0x40,
            ..Default::default()
        };
        let empty = ProgramHeader {
            ty: PHType::Load.into(),
            ..Default::default()
        };
        let note = ProgramHeader {
            ty: 4,
            mem_size: 0x10,
            ..Default::default()
        };

        let mut file = Bytes {
            data: program(&[text, note, empty, bss]),
            pos: 0,
        };
        let (hdr, segs) = read_segments(&mut file).unwrap();
        assert_eq!(hdr.entry, 0x1234);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0], Segment {
            offset: 0x100,
            virt: 0x2000,
            file_size: 0x80,
            mem_size: 0x80,
            perm: Perm::R | Perm::X,
        });
        assert_eq!(segs[1].virt, 0x3000);
        assert_eq!(segs[1].file_size, 0);
        assert_eq!(segs[1].perm, Perm::RW);
    }

    #[test]
    fn bad_magic() {
        let mut data = program(&[]);
        data[1] = b'X';
        let mut file = Bytes { data, pos: 0 };
        assert_eq!(
            read_segments(&mut file).unwrap_err().code(),
            Code::InvalidElf
        );
    }

    #[test]
    fn truncated() {
        let mut file = Bytes {
            data: MAGIC.to_vec(),
            pos: 0,
        };
        assert!(read_segments(&mut file).is_err());
    }
}
