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

//! Contains the activity abstraction

use core::fmt;

use crate::boxed::Box;
use crate::cap::{Capability, Selector};
use crate::cell::Cell;
use crate::client::ResMng;
use crate::col::Vec;
use crate::com::MemGate;
use crate::errors::Error;
use crate::kif::{CapRngDesc, Perm, TileDesc};
use crate::mem::GlobOff;
use crate::rc::Rc;
use crate::syscalls;
use crate::tcu::{ActId, EpId, TileId};
use crate::tiles::{KMem, OwnActivity, Tile};

/// Represents an activity on a tile
///
/// [`Activity`] holds the properties that are shared by the two flavors of activities:
/// [`OwnActivity`] for the own activity and [`ChildActivity`](`crate::tiles::ChildActivity`) for
/// created activities. Both implement `Deref` to [`Activity`].
pub struct Activity {
    pub(crate) id: ActId,
    // the child is removed from the resource manager before its capability is revoked
    pub(crate) rmng: Option<ResMng>,
    pub(crate) cap: Capability,
    pub(crate) tile: Rc<Tile>,
    pub(crate) kmem: Rc<KMem>,
    pub(crate) eps_start: EpId,
    pub(crate) data: Vec<u64>,
}

base::activity_local! {
    static OWN: Cell<Option<&'static OwnActivity>> = Cell::new(None);
}

impl Activity {
    pub(crate) fn new_act(cap: Capability, tile: Rc<Tile>, kmem: Rc<KMem>) -> Self {
        Activity {
            id: 0,
            rmng: None,
            cap,
            tile,
            kmem,
            eps_start: 0,
            data: Vec::new(),
        }
    }

    /// Returns the own activity
    ///
    /// # Panics
    ///
    /// Panics if the runtime has not been initialized for the current activity.
    pub fn own() -> &'static OwnActivity {
        match Self::try_own() {
            Some(own) => own,
            None => panic!("runtime not initialized"),
        }
    }

    /// Returns the own activity, if the runtime has been initialized
    pub fn try_own() -> Option<&'static OwnActivity> {
        OWN.with(|o| o.get())
    }

    /// Returns the capability selector.
    pub fn sel(&self) -> Selector {
        self.cap.sel()
    }

    /// Returns the ID of the activity (for debugging purposes)
    pub fn id(&self) -> ActId {
        self.id
    }

    /// Returns the tile the activity has been assigned to.
    pub fn tile(&self) -> &Rc<Tile> {
        &self.tile
    }

    /// Returns the description of the tile the activity has been assigned to.
    pub fn tile_desc(&self) -> TileDesc {
        self.tile.desc()
    }

    /// Returns the id of the tile the activity has been assigned to.
    pub fn tile_id(&self) -> TileId {
        self.tile.id()
    }

    /// Returns a reference to the activity's kernel memory.
    pub fn kmem(&self) -> &Rc<KMem> {
        &self.kmem
    }

    /// Returns the first standard endpoint of the activity
    pub fn eps_start(&self) -> EpId {
        self.eps_start
    }

    /// Revokes the given capability range from `self`.
    ///
    /// If `del_only` is true, only the delegations are revoked, that is, the capability is not
    /// revoked from `self`.
    pub fn revoke(&self, crd: CapRngDesc, del_only: bool) -> Result<(), Error> {
        syscalls::revoke(self.sel(), crd, !del_only)
    }

    /// Creates a new [`MemGate`] that refers to the region `addr`..`addr`+`size` in the address
    /// space of this activity.
    pub fn get_mem(&self, addr: GlobOff, size: GlobOff, perms: Perm) -> Result<MemGate, Error> {
        MemGate::new_foreign(self.sel(), addr, size, perms)
    }
}

impl fmt::Debug for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "Activity[id: {}, sel: {}, tile: {:?}]",
            self.id(),
            self.sel(),
            self.tile()
        )
    }
}

pub(crate) fn init() -> Result<(), Error> {
    // the own activity lives until the activity exits
    let own: &'static OwnActivity = Box::leak(Box::new(OwnActivity::new()));
    OWN.with(|o| o.set(Some(own)));
    // files and mounts refer to the own activity
    own.load_env()
}
