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

//! The resource-manager interface
//!
//! The resource manager hands out memory and tiles to its children and keeps track of them. All
//! requests start with the [`Operation`], followed by the request struct.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::kif::{CapSel, Perm, TileDesc};
use crate::mem::GlobOff;
use crate::serialize::{Deserialize, Serialize};
use crate::tcu::TileId;

/// The resource manager calls
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
    AddChild,
    RemChild,
    OpenSess,
    CloseSess,
    AllocMem,
    FreeMem,
    AllocTile,
    FreeTile,
    UseMod,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddChild<'s> {
    pub id: u64,
    pub sel: CapSel,
    pub sgate: CapSel,
    pub name: &'s str,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemChild {
    pub sel: CapSel,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpenSess<'s> {
    pub dst: CapSel,
    pub name: &'s str,
    pub arg: &'s str,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CloseSess {
    pub sel: CapSel,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AllocMem {
    pub dst: CapSel,
    pub size: GlobOff,
    pub perms: Perm,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FreeMem {
    pub sel: CapSel,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AllocTile {
    pub dst: CapSel,
    pub desc: TileDesc,
}

/// The reply for [`AllocTile`]
#[derive(Debug, Serialize, Deserialize)]
pub struct AllocTileReply {
    pub id: TileId,
    pub desc: TileDesc,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FreeTile {
    pub sel: CapSel,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UseMod<'s> {
    pub dst: CapSel,
    pub name: &'s str,
}

/// The reply for [`UseMod`], containing the size of the boot module
#[derive(Debug, Serialize, Deserialize)]
pub struct UseModReply {
    pub size: GlobOff,
}
