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

//! The upcall interface

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::errors::Code;
use crate::kif::CapSel;
use crate::serialize::{Deserialize, Serialize};

/// The upcalls
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize_repr,
    Deserialize_repr,
)]
#[repr(u64)]
pub enum Operation {
    /// waits for activity exits
    ActWait,
}

/// The default upcall, containing the opcode and event
#[repr(C)]
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct DefaultUpcall {
    pub opcode: Operation,
    pub event: u64,
}

/// The activity-wait upcall that is sent upon a activity-exit
#[repr(C)]
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct ActivityWait {
    pub def: DefaultUpcall,
    pub error: Code,
    pub act_sel: CapSel,
    pub exitcode: Code,
}
