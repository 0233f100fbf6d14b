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

//! The file system for boot modules

use core::fmt;

use crate::cap::Selector;
use crate::com::MemGate;
use crate::errors::{Code, Error};
use crate::io::{LogFlags, Read};
use crate::log;
use crate::mem::GlobOff;
use crate::serialize::{M3Deserializer, M3Serializer, VecSink};
use crate::tiles::ChildActivity;
use crate::vfs::{File, FileInfo, FileMode, OpenFlags, Seek, SeekMode};

/// A read-only file system that provides access to the boot modules
///
/// Every boot module is a file at the root of the file system, named after the module. Modules are
/// obtained from the resource manager on open.
#[derive(Debug, Default)]
pub struct BootFS {}

impl BootFS {
    /// The type tag of this file system
    pub const FS_TYPE: u8 = b'B';

    /// Creates a new boot-module file system
    pub fn new() -> Self {
        Self::default()
    }

    fn mod_name(path: &str) -> Result<&str, Error> {
        let name = path.trim_start_matches('/');
        if name.is_empty() || name.contains('/') {
            return Err(Error::new(Code::NoSuchFile));
        }
        Ok(name)
    }

    /// Opens the boot module at `path` (relative to the mount point)
    pub fn open(&self, path: &str, flags: OpenFlags) -> Result<File, Error> {
        if flags.intersects(OpenFlags::W) {
            return Err(Error::new(Code::NoPerm));
        }

        let name = Self::mod_name(path)?;
        let mem = MemGate::new_bind_bootmod(name).map_err(|e| match e.code() {
            Code::NotFound => Error::new(Code::NoSuchFile),
            _ => e,
        })?;
        let size = mem.size()? as usize;
        log!(LogFlags::LibFS, "bootfs: opened {} ({} bytes)", name, size);
        Ok(File::Mod(ModFile::new(mem, size)))
    }

    /// Retrieves the file information of the boot module at `path`
    pub fn stat(&self, path: &str) -> Result<FileInfo, Error> {
        self.open(path, OpenFlags::R).and_then(|f| f.stat())
    }

    pub(crate) fn serialize(&self, _s: &mut M3Serializer<VecSink>) {
    }

    pub(crate) fn unserialize(_s: &mut M3Deserializer<'_>) -> Result<Self, Error> {
        Ok(Self::new())
    }
}

/// A boot module opened for reading
pub struct ModFile {
    mem: MemGate,
    size: usize,
    pos: usize,
}

impl ModFile {
    pub(crate) fn new(mem: MemGate, size: usize) -> Self {
        ModFile { mem, size, pos: 0 }
    }

    /// Returns the selector of the memory capability for the module
    pub fn sel(&self) -> Selector {
        self.mem.sel()
    }

    pub(crate) fn stat(&self) -> FileInfo {
        FileInfo {
            mode: FileMode::MOD_DEF,
            size: self.size,
            blocksize: 1,
        }
    }

    pub(crate) fn delegate(&self, act: &ChildActivity) -> Result<(), Error> {
        act.delegate_obj(self.mem.sel())
    }

    pub(crate) fn serialize(&self, s: &mut M3Serializer<VecSink>) {
        s.push(self.mem.sel());
        s.push(self.size);
        s.push(self.pos);
    }

    pub(crate) fn unserialize(s: &mut M3Deserializer<'_>) -> Result<Self, Error> {
        let sel: Selector = s.pop()?;
        let size: usize = s.pop()?;
        let pos: usize = s.pop()?;
        Ok(ModFile {
            mem: MemGate::new_bind(sel),
            size,
            pos: pos.min(size),
        })
    }
}

impl Read for ModFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let amount = buf.len().min(self.size - self.pos);
        if amount > 0 {
            self.mem.read(&mut buf[0..amount], self.pos as GlobOff)?;
            self.pos += amount;
        }
        Ok(amount)
    }
}

impl Seek for ModFile {
    fn seek(&mut self, off: usize, whence: SeekMode) -> Result<usize, Error> {
        let pos = match whence {
            SeekMode::Set => off,
            SeekMode::Cur => self.pos.checked_add(off).ok_or_else(|| Error::new(Code::InvArgs))?,
            SeekMode::End => self.size,
        };
        if pos > self.size {
            return Err(Error::new(Code::InvArgs));
        }
        self.pos = pos;
        Ok(pos)
    }
}

impl fmt::Debug for ModFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ModFile[sel: {}, size: {:#x}, pos: {:#x}]",
            self.mem.sel(),
            self.size,
            self.pos
        )
    }
}
