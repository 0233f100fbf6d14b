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

//! The TileMux ABI on the loopback platform
//!
//! There is no TileMux on the loopback platform. Waiting is done directly via the TCU and exiting
//! unwinds to the entry of the activity's thread.

use std::panic;

use crate::arch::TMABIOps;
use crate::errors::{Code, Error};
use crate::tcu::{EpId, TCU};
use crate::time::TimeDuration;
use crate::tmif::Operation;

use super::machine::ExitRequest;

pub struct LoopbackTMABI {}

impl TMABIOps for LoopbackTMABI {
    fn call1(op: Operation, arg1: usize) -> Result<(), Error> {
        match op {
            Operation::Exit => panic::resume_unwind(Box::new(ExitRequest(Code::from(arg1 as u32)))),
            Operation::Yield | Operation::Noop | Operation::FlushInv => Ok(()),
            _ => Err(Error::new(Code::NotSup)),
        }
    }

    fn call2(_op: Operation, _arg1: usize, _arg2: usize) -> Result<(), Error> {
        Err(Error::new(Code::NotSup))
    }

    fn call3(op: Operation, arg1: usize, _arg2: usize, arg3: usize) -> Result<(), Error> {
        match op {
            // interrupts are not supported; we wait for messages and events only
            Operation::Wait => TCU::wait_for_msg(arg1 as EpId, match arg3 {
                usize::MAX => None,
                n => Some(TimeDuration::from_nanos(n as u64)),
            }),
            _ => Err(Error::new(Code::NotSup)),
        }
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
