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

use core::arch::asm;

use crate::arch::TMABIOps;
use crate::errors::Error;
use crate::tmif::{self, Operation};

pub struct RISCVTMABI {}

impl TMABIOps for RISCVTMABI {
    fn call1(op: Operation, arg1: usize) -> Result<(), Error> {
        Self::call2(op, arg1, 0)
    }

    fn call2(op: Operation, arg1: usize, arg2: usize) -> Result<(), Error> {
        let mut res: usize = op.into();
        // safety: TileMux only reads the argument registers and writes the result into a0
        unsafe {
            asm!(
                "ecall",
                inout("a0") res,
                in("a1") arg1,
                in("a2") arg2,
            );
        }
        tmif::get_result(res)
    }

    fn call3(op: Operation, arg1: usize, arg2: usize, arg3: usize) -> Result<(), Error> {
        let mut res: usize = op.into();
        // safety: see call2
        unsafe {
            asm!(
                "ecall",
                inout("a0") res,
                in("a1") arg1,
                in("a2") arg2,
                in("a3") arg3,
            );
        }
        tmif::get_result(res)
    }

    fn call4(
        op: Operation,
        arg1: usize,
        arg2: usize,
        arg3: usize,
        arg4: usize,
    ) -> Result<(), Error> {
        let mut res: usize = op.into();
        // safety: see call2
        unsafe {
            asm!(
                "ecall",
                inout("a0") res,
                in("a1") arg1,
                in("a2") arg2,
                in("a3") arg3,
                in("a4") arg4,
            );
        }
        tmif::get_result(res)
    }
}
