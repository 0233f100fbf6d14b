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

//! Console output via the TCU's print command

use core::fmt;

use crate::errors::Error;
use crate::io;
use crate::tcu::TCU;

/// The console of the tile
///
/// Writes end up in the host's log. Reading always yields end of file.
#[derive(Default)]
pub struct Serial {}

impl Serial {
    pub const fn new() -> Self {
        Self {}
    }
}

impl io::Read for Serial {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Error> {
        Ok(0)
    }
}

impl io::Write for Serial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        let mut rem = buf;
        // the TCU prints at most a page at once
        while !rem.is_empty() {
            match TCU::print(rem) {
                0 => break,
                n => rem = &rem[n..],
            }
        }
        Ok(buf.len() - rem.len())
    }
}

impl fmt::Debug for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Serial")
    }
}
