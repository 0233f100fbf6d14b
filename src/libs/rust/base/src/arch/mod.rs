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

//! Contains the platform-specific parts: register access and the TileMux ABI

use cfg_if::cfg_if;

use crate::errors::Error;
use crate::tmif::Operation;

/// The TileMux ABI operations
///
/// The signatures are identical on all platforms; only the way TileMux is entered differs.
pub trait TMABIOps {
    /// A TileMux call with a single argument
    fn call1(op: Operation, arg1: usize) -> Result<(), Error>;

    /// A TileMux call with a two arguments
    fn call2(op: Operation, arg1: usize, arg2: usize) -> Result<(), Error>;

    /// A TileMux call with a three arguments
    fn call3(op: Operation, arg1: usize, arg2: usize, arg3: usize) -> Result<(), Error>;

    /// A TileMux call with a four arguments
    fn call4(
        op: Operation,
        arg1: usize,
        arg2: usize,
        arg3: usize,
        arg4: usize,
    ) -> Result<(), Error>;
}

cfg_if! {
    if #[cfg(feature = "loopback")] {
        pub mod loopback;

        pub(crate) use self::loopback::tcuio as tcu;
        pub type TMABI = self::loopback::tmabi::LoopbackTMABI;
    }
    else {
        mod mmio;

        pub(crate) use self::mmio as tcu;

        cfg_if! {
            if #[cfg(target_arch = "riscv64")] {
                mod riscv;

                pub type TMABI = self::riscv::RISCVTMABI;
            }
            else {
                mod unsupported;

                pub type TMABI = self::unsupported::UnsupportedTMABI;
            }
        }
    }
}
