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

//! The virtual file system of the own activity

use crate::errors::{Code, Error};
use crate::io::LogFlags;
use crate::log;
use crate::rc::Rc;
use crate::tiles::Activity;
use crate::vfs::{BootFS, FileInfo, FileRef, FileSystem, OpenFlags};

/// Mounts the file system of type `fs_type` at `path`
///
/// The only supported type is "bootfs", which provides the boot modules.
pub fn mount(path: &str, fs_type: &str) -> Result<(), Error> {
    let fs = match fs_type {
        "bootfs" => FileSystem::Boot(BootFS::new()),
        _ => return Err(Error::new(Code::InvArgs)),
    };
    log!(LogFlags::LibFS, "vfs: mounting {} at {}", fs_type, path);
    Activity::own().mounts().add(path, Rc::new(fs))
}

/// Unmounts the file system at `path`
pub fn unmount(path: &str) -> Result<(), Error> {
    Activity::own().mounts().remove(path)
}

/// Opens the file at `path` with given flags and adds it to the own file table
///
/// The returned [`FileRef`] closes the file on drop.
pub fn open(path: &str, flags: OpenFlags) -> Result<FileRef, Error> {
    let (fs, rest) = Activity::own().mounts().resolve(path)?;
    let file = match &*fs {
        FileSystem::Boot(bfs) => bfs.open(rest, flags)?,
    };
    let fd = Activity::own().files().add(file)?;
    log!(LogFlags::LibFS, "vfs: opened {} as fd {}", path, fd);
    Ok(FileRef::new_owned(fd))
}

/// Retrieves the file information of the file at `path`
pub fn stat(path: &str) -> Result<FileInfo, Error> {
    let (fs, rest) = Activity::own().mounts().resolve(path)?;
    match &*fs {
        FileSystem::Boot(bfs) => bfs.stat(rest),
    }
}
