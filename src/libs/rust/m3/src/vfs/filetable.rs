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
use crate::serialize::{M3Deserializer, M3Serializer, VecSink};
use crate::tiles::ChildActivity;
use crate::vfs::File;

/// A file descriptor
pub type Fd = usize;

/// The maximum number of files per [`FileTable`].
pub const MAX_FILES: usize = 32;

/// The table of open files
///
/// Files are owned by the table; [`FileRef`](crate::vfs::FileRef)s refer to them by file
/// descriptor. Removing a file from the table (or dropping the table) gives the file the chance
/// to notify its peer, which is needed for pipes.
#[derive(Default)]
pub struct FileTable {
    files: Vec<Option<File>>,
}

impl FileTable {
    /// Adds the given file to the table by allocating the lowest free file descriptor
    pub fn add(&mut self, file: File) -> Result<Fd, Error> {
        let fd = match self.files.iter().position(|f| f.is_none()) {
            Some(fd) => fd,
            None if self.files.len() < MAX_FILES => self.files.len(),
            None => return Err(Error::new(Code::NoSpace)),
        };
        self.set(fd, file)?;
        Ok(fd)
    }

    /// Adds the given file to the table using the file descriptor `fd`
    ///
    /// Fails with [`Exists`](Code::Exists) if `fd` is already in use.
    pub fn set(&mut self, fd: Fd, file: File) -> Result<(), Error> {
        if fd >= MAX_FILES {
            return Err(Error::new(Code::InvArgs));
        }
        if self.exists(fd) {
            return Err(Error::new(Code::Exists));
        }
        if self.files.len() <= fd {
            self.files.resize_with(fd + 1, || None);
        }
        self.files[fd] = Some(file);
        Ok(())
    }

    /// Returns true if the file descriptor `fd` is in use
    pub fn exists(&self, fd: Fd) -> bool {
        matches!(self.files.get(fd), Some(Some(_)))
    }

    /// Returns the file with given file descriptor
    pub fn get(&self, fd: Fd) -> Option<&File> {
        self.files.get(fd).and_then(|f| f.as_ref())
    }

    /// Returns the file with given file descriptor for modification
    pub fn get_mut(&mut self, fd: Fd) -> Option<&mut File> {
        self.files.get_mut(fd).and_then(|f| f.as_mut())
    }

    /// Removes the file with given file descriptor from the table
    pub fn remove(&mut self, fd: Fd) {
        if let Some(mut file) = self.files.get_mut(fd).and_then(|f| f.take()) {
            file.remove();
        }
    }

    pub(crate) fn delegate(&self, act: &ChildActivity) -> Result<(), Error> {
        for (_cfd, pfd) in act.files() {
            if let Some(file) = self.get(*pfd) {
                file.delegate(act)?;
            }
        }
        Ok(())
    }

    /// Serializes the files in `map`, which maps the child's file descriptors to ours
    pub(crate) fn serialize(&self, map: &[(Fd, Fd)], s: &mut M3Serializer<VecSink>) {
        let files = map
            .iter()
            .filter_map(|(cfd, pfd)| self.get(*pfd).map(|f| (*cfd, f)))
            .collect::<Vec<_>>();

        s.push(files.len());
        for (cfd, file) in files {
            s.push(cfd);
            s.push(file.file_type());
            file.serialize(s);
        }
    }

    pub(crate) fn unserialize(s: &mut M3Deserializer<'_>) -> Result<FileTable, Error> {
        let mut ft = FileTable::default();

        let count: usize = s.pop()?;
        for _ in 0..count {
            let fd: Fd = s.pop()?;
            let ty: u8 = s.pop()?;
            ft.set(fd, File::unserialize(ty, s)?)?;
        }

        Ok(ft)
    }
}

impl Drop for FileTable {
    fn drop(&mut self) {
        for fd in 0..self.files.len() {
            self.remove(fd);
        }
    }
}

impl fmt::Debug for FileTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FileTable[")?;
        for (fd, file) in self.files.iter().enumerate() {
            if let Some(file) = file {
                writeln!(f, "  {} -> {:?}", fd, file)?;
            }
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_lowest_fd() {
        let mut ft = FileTable::default();
        assert_eq!(ft.add(File::new_serial()), Ok(0));
        ft.set(2, File::new_serial()).unwrap();
        assert_eq!(ft.add(File::new_serial()), Ok(1));
        assert_eq!(ft.add(File::new_serial()), Ok(3));

        ft.remove(1);
        assert!(!ft.exists(1));
        assert_eq!(ft.add(File::new_serial()), Ok(1));
    }

    #[test]
    fn set_twice() {
        let mut ft = FileTable::default();
        ft.set(4, File::new_serial()).unwrap();
        assert_eq!(
            ft.set(4, File::new_serial()).unwrap_err().code(),
            Code::Exists
        );
        assert_eq!(
            ft.set(MAX_FILES, File::new_serial()).unwrap_err().code(),
            Code::InvArgs
        );
    }

    #[test]
    fn full() {
        let mut ft = FileTable::default();
        for _ in 0..MAX_FILES {
            ft.add(File::new_serial()).unwrap();
        }
        assert_eq!(
            ft.add(File::new_serial()).unwrap_err().code(),
            Code::NoSpace
        );
    }

    #[test]
    fn transfer_mapped_fds() {
        let mut ft = FileTable::default();
        ft.set(0, File::new_serial()).unwrap();
        ft.set(5, File::new_serial()).unwrap();

        let mut s = M3Serializer::new(VecSink::new());
        // the child gets our fd 5 as its stdout; fd 7 does not exist and is skipped
        ft.serialize(&[(1, 5), (2, 7)], &mut s);
        let words = s.into_sink().into_vec();

        let child = FileTable::unserialize(&mut M3Deserializer::new(&words)).unwrap();
        assert!(!child.exists(0));
        assert!(child.exists(1));
        assert!(!child.exists(2));
        assert_eq!(child.get(1).map(|f| f.file_type()), Some(b'S'));
    }

    #[test]
    fn unknown_type() {
        let words = [1, 0, b'?' as u64];
        assert_eq!(
            FileTable::unserialize(&mut M3Deserializer::new(&words))
                .unwrap_err()
                .code(),
            Code::InvArgs
        );
    }
}
