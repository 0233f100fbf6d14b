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

use crate::arch::TMABIOps;
use crate::errors::{Code, Error};
use crate::tmif::Operation;

/// The TileMux ABI for ISAs without TileMux support, which rejects all calls
pub struct UnsupportedTMABI {}

impl TMABIOps for UnsupportedTMABI {
    fn call1(_op: Operation, _arg1: usize) -> Result<(), Error> {
        Err(Error::new(Code::NotSup))
    }

    fn call2(_op: Operation, _arg1: usize, _arg2: usize) -> Result<(), Error> {
        Err(Error::new(Code::NotSup))
    }

    fn call3(_op: Operation, _arg1: usize, _arg2: usize, _arg3: usize) -> Result<(), Error> {
        Err(Error::new(Code::NotSup))
    }

    fn call4(
        _op: Operation,
        _arg1: usize,
        _arg2: usize,
        _arg3: usize,
        _arg4: usize,
    ) -> Result<(), Error> {
        Err(Error::new(Code::NotSup))
    }
}
