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

//! The virtual file system
//!
//! Every activity has a [`FileTable`] with its open files and a [`MountTable`] with its mounted
//! file systems. Both are passed on to children: the parent selects which of its files and mount
//! points the child gets (see [`ChildActivity`](crate::tiles::ChildActivity)), delegates the
//! required capabilities, and serializes the state into the child's environment.
//!
//! Files are either boot modules ([`ModFile`]), ends of a [`DirectPipe`], or the serial line.

mod bootfs;
mod dirpipe;
mod file;
mod fileref;
mod filetable;
mod mounttable;
#[allow(clippy::module_inception)]
mod vfs;

pub use self::bootfs::{BootFS, ModFile};
pub use self::dirpipe::{DirectPipe, PipeReader, PipeWriter, MSG_BUF_SIZE, MSG_SIZE};
pub use self::file::{File, FileEvent, FileInfo, FileMode, OpenFlags, Seek, SeekMode};
pub use self::fileref::FileRef;
pub use self::filetable::{Fd, FileTable, MAX_FILES};
pub use self::mounttable::{FSHandle, FileSystem, MountTable};

#[allow(non_snake_case)]
pub mod VFS {
    pub use crate::vfs::vfs::*;
}
