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
use num_enum::IntoPrimitive;
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::const_assert;
use crate::errors::{Code, Error};
use crate::io::{Read, Serial, Write};
use crate::kif;
use crate::serialize::{M3Deserializer, M3Serializer, VecSink};
use crate::tiles::ChildActivity;
use crate::vfs::{ModFile, PipeReader, PipeWriter};

/// The different seek modes
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, Serialize_repr, Deserialize_repr)]
#[repr(u32)]
pub enum SeekMode {
    /// Set the file position to given absolute offset
    Set,
    /// Set the file position relatively to the current position
    Cur,
    /// Set the file position to the end of the file
    End,
}

bitflags! {
    /// The flags to open files
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct OpenFlags : u32 {
        /// Opens the file for reading
        const R         = 0b0000_0001;
        /// Opens the file for writing
        const W         = 0b0000_0010;
        /// Opens the file for code execution
        const X         = 0b0000_0100;

        /// Opens the file for reading and writing
        const RW        = Self::R.bits() | Self::W.bits();
        /// Opens the file for reading and code execution
        const RX        = Self::R.bits() | Self::X.bits();
    }
}

impl From<OpenFlags> for kif::Perm {
    fn from(flags: OpenFlags) -> Self {
        const_assert!(OpenFlags::R.bits() == kif::Perm::R.bits());
        const_assert!(OpenFlags::W.bits() == kif::Perm::W.bits());
        const_assert!(OpenFlags::X.bits() == kif::Perm::X.bits());
        kif::Perm::from_bits_truncate(flags.bits())
    }
}

bitflags! {
    /// The file mode (type and access permissions)
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct FileMode : u16 {
        const IFMT      = 0o0160000;
        const IFPIP     = 0o0110000;
        const IFREG     = 0o0100000;
        const IFCHR     = 0o0020000;
        const IRUSR     = 0o0000400;
        const IWUSR     = 0o0000200;
        const IXUSR     = 0o0000100;
        const IRGRP     = 0o0000040;
        const IROTH     = 0o0000004;

        const MOD_DEF   = Self::IFREG.bits() | 0o0444;
        const PIPE_DEF  = Self::IFPIP.bits() | 0o0600;
        const CHR_DEF   = Self::IFCHR.bits() | 0o0600;
        const PERM      = 0o777;
    }
}

impl FileMode {
    /// Returns true if this file mode represents a regular file
    pub fn is_reg(self) -> bool {
        (self & Self::IFMT) == Self::IFREG
    }

    /// Returns true if this file mode represents a pipe
    pub fn is_pipe(self) -> bool {
        (self & Self::IFMT) == Self::IFPIP
    }
}

/// The file information that can be retrieved via [`File::stat`] and
/// [`VFS::stat`](crate::vfs::VFS::stat)
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub mode: FileMode,
    pub size: usize,
    pub blocksize: u32,
}

bitflags! {
    /// The events that are supported for a [`File`]
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct FileEvent : u32 {
        /// Input is available, that is, data can be read from the file
        const INPUT         = 1;
        /// Output is available, that is, data can be written to the file
        const OUTPUT        = 2;
    }
}

/// Trait for resources that are seekable
pub trait Seek {
    /// Seeks to position `off`, using the given seek mode
    ///
    /// If `whence` == [`SeekMode::Set`], the position is set to `off`.
    /// If `whence` == [`SeekMode::Cur`], the position is increased by `off`.
    /// If `whence` == [`SeekMode::End`], the position is set to the end of the file.
    fn seek(&mut self, _off: usize, _whence: SeekMode) -> Result<usize, Error> {
        Err(Error::new(Code::NotSup))
    }
}

/// An open file
///
/// Files come in different kinds, which are distinguished by a type tag. The tag is written in
/// front of the file's state when the file is transferred to a child activity (see
/// [`FileTable`](crate::vfs::FileTable)), which rebuilds the file from the tag and the state.
pub enum File {
    /// A read-only boot module
    Mod(ModFile),
    /// The reading end of a [`DirectPipe`](crate::vfs::DirectPipe)
    PipeReader(PipeReader),
    /// The writing end of a [`DirectPipe`](crate::vfs::DirectPipe)
    PipeWriter(PipeWriter),
    /// The serial line
    Serial(Serial),
}

impl File {
    const TYPE_MOD: u8 = b'M';
    const TYPE_PIPE_READER: u8 = b'R';
    const TYPE_PIPE_WRITER: u8 = b'W';
    const TYPE_SERIAL: u8 = b'S';

    /// Creates a new file for the serial line
    pub fn new_serial() -> Self {
        Self::Serial(Serial::new())
    }

    /// Returns the type tag that is used for serialization
    pub fn file_type(&self) -> u8 {
        match self {
            Self::Mod(_) => Self::TYPE_MOD,
            Self::PipeReader(_) => Self::TYPE_PIPE_READER,
            Self::PipeWriter(_) => Self::TYPE_PIPE_WRITER,
            Self::Serial(_) => Self::TYPE_SERIAL,
        }
    }

    /// Retrieves the file information
    pub fn stat(&self) -> Result<FileInfo, Error> {
        match self {
            Self::Mod(m) => Ok(m.stat()),
            Self::PipeReader(_) | Self::PipeWriter(_) => Ok(FileInfo {
                mode: FileMode::PIPE_DEF,
                ..Default::default()
            }),
            Self::Serial(_) => Ok(FileInfo {
                mode: FileMode::CHR_DEF,
                ..Default::default()
            }),
        }
    }

    /// Maps the region `off`..`off`+`len` of this file at address `virt` with given permissions
    ///
    /// None of the file kinds can be mapped.
    pub fn map(
        &self,
        _virt: usize,
        _off: usize,
        _len: usize,
        _perm: kif::Perm,
    ) -> Result<(), Error> {
        Err(Error::new(Code::NotSup))
    }

    /// Checks whether any of the given events has arrived
    ///
    /// If [`FileEvent::INPUT`] is given and reading from the file would make progress, the
    /// function returns true. Likewise for [`FileEvent::OUTPUT`] and writing.
    pub fn check_events(&mut self, events: FileEvent) -> bool {
        match self {
            Self::PipeReader(r) => r.check_events(events),
            Self::PipeWriter(w) => w.check_events(events),
            Self::Mod(_) | Self::Serial(_) => true,
        }
    }

    /// Delegates the capabilities of this file to `act`
    pub fn delegate(&self, act: &ChildActivity) -> Result<(), Error> {
        match self {
            Self::Mod(m) => m.delegate(act),
            Self::PipeReader(r) => r.delegate(act),
            Self::PipeWriter(w) => w.delegate(act),
            Self::Serial(_) => Ok(()),
        }
    }

    /// Serializes the state of this file into `s` (without type tag)
    pub fn serialize(&self, s: &mut M3Serializer<VecSink>) {
        match self {
            Self::Mod(m) => m.serialize(s),
            Self::PipeReader(r) => r.serialize(s),
            Self::PipeWriter(w) => w.serialize(s),
            Self::Serial(_) => {},
        }
    }

    /// Creates a file of type `ty` from the state in `s`
    pub fn unserialize(ty: u8, s: &mut M3Deserializer<'_>) -> Result<Self, Error> {
        match ty {
            Self::TYPE_MOD => ModFile::unserialize(s).map(Self::Mod),
            Self::TYPE_PIPE_READER => PipeReader::unserialize(s).map(Self::PipeReader),
            Self::TYPE_PIPE_WRITER => PipeWriter::unserialize(s).map(Self::PipeWriter),
            Self::TYPE_SERIAL => Ok(Self::new_serial()),
            _ => Err(Error::new(Code::InvArgs)),
        }
    }

    /// Executes the final actions when the file is removed from the file table
    pub(crate) fn remove(&mut self) {
        match self {
            Self::PipeReader(r) => r.remove(),
            Self::PipeWriter(w) => w.remove(),
            Self::Mod(_) | Self::Serial(_) => {},
        }
    }
}

impl Read for File {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        match self {
            Self::Mod(m) => m.read(buf),
            Self::PipeReader(r) => r.read(buf),
            Self::PipeWriter(_) => Err(Error::new(Code::NoPerm)),
            Self::Serial(s) => s.read(buf),
        }
    }
}

impl Write for File {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        match self {
            Self::PipeWriter(w) => w.write(buf),
            Self::Mod(_) | Self::PipeReader(_) => Err(Error::new(Code::NoPerm)),
            Self::Serial(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> Result<(), Error> {
        match self {
            Self::Serial(s) => s.flush(),
            _ => Ok(()),
        }
    }
}

impl Seek for File {
    fn seek(&mut self, off: usize, whence: SeekMode) -> Result<usize, Error> {
        match self {
            Self::Mod(m) => m.seek(off, whence),
            Self::PipeReader(_) | Self::PipeWriter(_) => Err(Error::new(Code::SeekPipe)),
            Self::Serial(_) => Err(Error::new(Code::NotSup)),
        }
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mod(m) => write!(f, "{:?}", m),
            Self::PipeReader(r) => write!(f, "{:?}", r),
            Self::PipeWriter(w) => write!(f, "{:?}", w),
            Self::Serial(s) => write!(f, "{:?}", s),
        }
    }
}
