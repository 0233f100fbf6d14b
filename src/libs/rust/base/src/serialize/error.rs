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

//! Errors that occur during (de)serialization are reported as invalid arguments

use core::fmt::Display;

use crate::errors::{Code, Error};

macro_rules! serde_error {
    ($($kind:ident),*) => {
        $(
            impl serde::$kind::Error for Error {
                fn custom<T: Display>(_msg: T) -> Self {
                    Self::new(Code::InvArgs)
                }
            }
        )*
    };
}

serde_error!(ser, de);
