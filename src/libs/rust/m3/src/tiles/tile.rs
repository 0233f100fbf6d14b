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

use core::fmt;

use crate::cap::{CapFlags, Capability, Selector};
use crate::errors::{Code, Error};
use crate::kif::TileDesc;
use crate::quota::Quota;
use crate::rc::Rc;
use crate::syscalls;
use crate::tcu::TileId;
use crate::tiles::{self, Activity};

/// A tile together with a share of its endpoints
///
/// Tiles are handed out by the resource manager. Each allocation yields all endpoints of the
/// tile; [`Tile::derive`] splits off a part of them. An allocated tile goes back to the resource
/// manager when the last reference is dropped.
pub struct Tile {
    cap: Capability,
    id: TileId,
    desc: TileDesc,
    allocated: bool,
}

impl Tile {
    /// Asks the resource manager for a free tile that matches `desc`
    pub fn new(desc: TileDesc) -> Result<Rc<Self>, Error> {
        let own = Activity::own();
        let sel = own.alloc_sel();
        let (id, desc) = own.resmng()?.alloc_tile(sel, desc)?;
        Ok(Rc::new(Self::with_cap(sel, CapFlags::KEEP_CAP, id, desc, true)))
    }

    /// Binds the tile at `sel`, which stays with its owner
    pub fn new_bind(id: TileId, desc: TileDesc, sel: Selector) -> Self {
        Self::with_cap(sel, CapFlags::KEEP_CAP, id, desc, false)
    }

    fn with_cap(
        sel: Selector,
        flags: CapFlags,
        id: TileId,
        desc: TileDesc,
        allocated: bool,
    ) -> Self {
        Self {
            cap: Capability::new(sel, flags),
            id,
            desc,
            allocated,
        }
    }

    /// Finds a tile by a `|`-separated list of alternatives, tried from left to right
    ///
    /// Besides the properties understood by [`TileDesc::with_properties`], an alternative can be
    /// `own` (the own tile, if it can host multiple activities), `clone` (another tile like the
    /// own one) or `compat` (another tile with the own type and ISA).
    pub fn get(desc: &str) -> Result<Rc<Self>, Error> {
        let own = Activity::own().tile();
        let compat = TileDesc::new(own.desc().tile_type(), own.desc().isa(), 0);

        for alt in desc.split('|') {
            let res = match alt {
                "own" if own.desc().has_virtmem() => return Ok(own.clone()),
                "own" => continue,
                "clone" => Self::new(own.desc()),
                "compat" => Self::new(compat),
                props => Self::new(compat.with_properties(props)),
            };
            if let Ok(tile) = res {
                return Ok(tile);
            }
        }
        Err(Error::new(Code::NotFound))
    }

    /// Creates a new tile object for the same tile and moves `eps` endpoints to it, if given
    pub fn derive(&self, eps: Option<u32>) -> Result<Rc<Self>, Error> {
        let sel = Activity::own().alloc_sel();
        syscalls::derive_tile(self.sel(), sel, eps)?;
        Ok(Rc::new(Self::with_cap(sel, CapFlags::empty(), self.id, self.desc, false)))
    }

    pub fn sel(&self) -> Selector {
        self.cap.sel()
    }

    pub fn id(&self) -> TileId {
        self.id
    }

    pub fn desc(&self) -> TileDesc {
        self.desc
    }

    /// Returns the endpoint quota
    pub fn quota(&self) -> Result<Quota<u32>, Error> {
        syscalls::tile_quota(self.sel())
    }
}

impl Drop for Tile {
    fn drop(&mut self) {
        // an exiting activity hands back everything at once
        if !self.allocated || tiles::is_leaving() {
            return;
        }
        if let Some(own) = Activity::try_own() {
            if let Ok(rmng) = own.resmng() {
                rmng.free_tile(self.sel()).ok();
                own.free_sel(self.sel());
            }
        }
    }
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile")
            .field("id", &self.id)
            .field("sel", &self.sel())
            .field("desc", &self.desc)
            .finish()
    }
}
