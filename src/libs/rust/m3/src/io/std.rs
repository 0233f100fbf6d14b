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

use crate::tiles::Activity;
use crate::vfs::{Fd, File, FileRef};

/// The file descriptor for the standard input stream
pub const STDIN_FILENO: Fd = 0;
/// The file descriptor for the standard output stream
pub const STDOUT_FILENO: Fd = 1;
/// The file descriptor for the standard error stream
pub const STDERR_FILENO: Fd = 2;

/// The standard input stream
pub fn stdin() -> FileRef {
    FileRef::new_bind(STDIN_FILENO)
}
/// The standard output stream
pub fn stdout() -> FileRef {
    FileRef::new_bind(STDOUT_FILENO)
}
/// The standard error stream
pub fn stderr() -> FileRef {
    FileRef::new_bind(STDERR_FILENO)
}

pub(crate) fn init() {
    let mut files = Activity::own().files();
    for fd in [STDIN_FILENO, STDOUT_FILENO, STDERR_FILENO] {
        if !files.exists(fd) {
            files.set(fd, File::new_serial());
        }
    }
}
