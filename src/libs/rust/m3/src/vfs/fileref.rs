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

use crate::errors::{Code, Error};
use crate::io::{Read, Write};
use crate::tiles::Activity;
use crate::vfs::{Fd, File, FileEvent, FileInfo, Seek, SeekMode};

/// A reference to an open file in the file table of the own activity
///
/// An *owned* reference removes the file from the file table on drop (closing it), whereas a
/// *bound* reference leaves the file open.
pub struct FileRef {
    fd: Fd,
    owned: bool,
}

impl FileRef {
    /// Creates a reference to the file with given file descriptor that closes the file on drop
    pub fn new_owned(fd: Fd) -> Self {
        FileRef { fd, owned: true }
    }

    /// Creates a reference to the file with given file descriptor that leaves the file open
    pub fn new_bind(fd: Fd) -> Self {
        FileRef { fd, owned: false }
    }

    /// Returns the file descriptor
    pub fn fd(&self) -> Fd {
        self.fd
    }

    /// Turns this reference into a bound reference and returns the file descriptor
    ///
    /// The file stays open and can be handed to a child via
    /// [`ChildActivity::add_file`](crate::tiles::ChildActivity::add_file).
    pub fn into_raw(mut self) -> Fd {
        self.owned = false;
        self.fd
    }

    fn with<R, F>(&self, func: F) -> Result<R, Error>
    where
        F: FnOnce(&mut File) -> Result<R, Error>,
    {
        let mut files = Activity::own().files();
        match files.get_mut(self.fd) {
            Some(file) => func(file),
            None => Err(Error::new(Code::BadFd)),
        }
    }

    /// Retrieves the file information
    pub fn stat(&self) -> Result<FileInfo, Error> {
        self.with(|f| f.stat())
    }

    /// Returns the type tag of the file
    pub fn file_type(&self) -> Result<u8, Error> {
        self.with(|f| Ok(f.file_type()))
    }

    /// Checks whether any of the given events has arrived
    pub fn check_events(&self, events: FileEvent) -> bool {
        self.with(|f| Ok(f.check_events(events))).unwrap_or(false)
    }
}

impl Read for FileRef {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        self.with(|f| f.read(buf))
    }
}

impl Write for FileRef {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        self.with(|f| f.write(buf))
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.with(|f| f.flush())
    }
}

impl Seek for FileRef {
    fn seek(&mut self, off: usize, whence: SeekMode) -> Result<usize, Error> {
        self.with(|f| f.seek(off, whence))
    }
}

impl Drop for FileRef {
    fn drop(&mut self) {
        if self.owned {
            if let Some(own) = Activity::try_own() {
                own.files().remove(self.fd);
            }
        }
    }
}

impl fmt::Debug for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileRef[fd: {}, owned: {}]", self.fd, self.owned)
    }
}
