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
use core::mem;

use crate::cap::{CapFlags, Selector};
use crate::cell::Cell;
use crate::com::gate::Gate;
use crate::errors::{Code, Error};
use crate::kif::INVALID_SEL;
use crate::mem::GlobOff;
use crate::syscalls;
use crate::tcu::{EpId, TileId, TCU};
use crate::tiles::{self, Activity};
use crate::util;

pub use crate::kif::Perm;

/// The arguments for [`MemGate`] creations.
pub struct MGateArgs {
    size: usize,
    perm: Perm,
    sel: Selector,
}

impl MGateArgs {
    /// Creates a new `MGateArgs` object with default settings
    pub fn new(size: usize, perm: Perm) -> MGateArgs {
        MGateArgs {
            size,
            perm,
            sel: INVALID_SEL,
        }
    }

    /// Sets the capability selector that should be used for this [`MemGate`]. Otherwise and by
    /// default, a new selector is allocated.
    pub fn sel(mut self, sel: Selector) -> Self {
        self.sel = sel;
        self
    }
}

/// Represents a contiguous region of memory, accessible via TCU
///
/// A memory gate provides RDMA-like access to a memory region, which is either located in a
/// memory tile or in the address space of an activity. The gate is activated on first use.
///
/// All transfers are checked against the size of the region before any command is issued to the
/// TCU and fail with [`OutOfBounds`](Code::OutOfBounds) if they exceed the region. Larger transfers
/// are split into multiple TCU commands. If one of them fails, the previous ones stay committed.
pub struct MemGate {
    gate: Gate,
    size: Cell<Option<GlobOff>>,
    resmng: bool,
}

impl MemGate {
    /// Creates a new `MemGate` that has access to a region of `size` bytes with permissions `perm`.
    ///
    /// This method will allocate `size` bytes with given permissions from the resource manager.
    pub fn new(size: usize, perm: Perm) -> Result<Self, Error> {
        Self::new_with(MGateArgs::new(size, perm))
    }

    /// Creates a new `MemGate` with given arguments.
    ///
    /// This method will allocate `size` bytes with given permissions from the resource manager.
    pub fn new_with(args: MGateArgs) -> Result<Self, Error> {
        let own = Activity::own();
        let sel = if args.sel == INVALID_SEL {
            own.alloc_sel()
        }
        else {
            args.sel
        };

        own.resmng()?.alloc_mem(sel, args.size as GlobOff, args.perm)?;
        Ok(MemGate {
            gate: Gate::new(sel, CapFlags::empty()),
            size: Cell::new(Some(args.size as GlobOff)),
            resmng: true,
        })
    }

    /// Creates a new `MemGate` for the region `addr`..`addr`+`size` in the address space of the
    /// given activity.
    pub fn new_foreign(
        act: Selector,
        addr: GlobOff,
        size: GlobOff,
        perm: Perm,
    ) -> Result<Self, Error> {
        let sel = Activity::own().alloc_sel();
        syscalls::create_mgate(sel, act, addr, size, perm)?;
        Ok(MemGate {
            gate: Gate::new(sel, CapFlags::empty()),
            size: Cell::new(Some(size)),
            resmng: false,
        })
    }

    /// Binds a new `MemGate` to the given selector. The capability is not revoked on drop.
    pub fn new_bind(sel: Selector) -> Self {
        MemGate {
            gate: Gate::new(sel, CapFlags::KEEP_CAP),
            size: Cell::new(None),
            resmng: false,
        }
    }

    /// Binds a new `MemGate` to the given selector and revokes the cap on drop.
    pub fn new_owned_bind(sel: Selector) -> Self {
        MemGate {
            gate: Gate::new(sel, CapFlags::empty()),
            size: Cell::new(None),
            resmng: false,
        }
    }

    /// Binds a new `MemGate` to the boot module with given name.
    pub fn new_bind_bootmod(name: &str) -> Result<Self, Error> {
        let own = Activity::own();
        let sel = own.alloc_sel();
        let size = own.resmng()?.use_mod(sel, name)?;
        Ok(MemGate {
            gate: Gate::new(sel, CapFlags::empty()),
            size: Cell::new(Some(size)),
            resmng: false,
        })
    }

    /// Returns the selector of this gate
    pub fn sel(&self) -> Selector {
        self.gate.sel()
    }

    /// Returns the endpoint of the gate, if activated
    pub fn ep(&self) -> Option<EpId> {
        self.gate.ep_id()
    }

    /// Activates the gate, if not already done, and returns the endpoint
    pub fn activate(&self) -> Result<EpId, Error> {
        self.gate.activate()
    }

    /// Returns the tile, address, and size of the memory region this `MemGate` references.
    pub fn region(&self) -> Result<(TileId, GlobOff, GlobOff), Error> {
        let region = syscalls::mgate_region(self.sel())?;
        self.size.set(Some(region.2));
        Ok(region)
    }

    /// Returns the size of the memory region in bytes
    pub fn size(&self) -> Result<GlobOff, Error> {
        match self.size.get() {
            Some(size) => Ok(size),
            None => self.region().map(|r| r.2),
        }
    }

    /// Derives a new `MemGate` from `self` that has access to a subset of `self`'s the memory
    /// region and has a subset of `self`'s permissions. The subset of the memory region is defined
    /// by `offset` and `size` and the permissions by `perm`.
    pub fn derive(&self, offset: GlobOff, size: usize, perm: Perm) -> Result<Self, Error> {
        let own = Activity::own();
        let sel = own.alloc_sel();
        self.derive_for(own.sel(), sel, offset, size, perm)
    }

    /// Like [`MemGate::derive`], but assigns the new `MemGate` to the given activity and uses given
    /// selector.
    pub fn derive_for(
        &self,
        act: Selector,
        sel: Selector,
        offset: GlobOff,
        size: usize,
        perm: Perm,
    ) -> Result<Self, Error> {
        syscalls::derive_mem(act, sel, self.sel(), offset, size as GlobOff, perm)?;
        Ok(MemGate {
            gate: Gate::new(sel, CapFlags::empty()),
            size: Cell::new(Some(size as GlobOff)),
            resmng: false,
        })
    }

    fn check_bounds(&self, len: usize, off: GlobOff) -> Result<(), Error> {
        let end = off
            .checked_add(len as GlobOff)
            .ok_or_else(|| Error::new(Code::OutOfBounds))?;
        if end > self.size()? {
            return Err(Error::new(Code::OutOfBounds));
        }
        Ok(())
    }

    /// Reads `data.len()` elements of type `T` from offset `off` of the region into `data`.
    pub fn read<T>(&self, data: &mut [T], off: GlobOff) -> Result<(), Error> {
        self.read_bytes(
            data.as_mut_ptr() as *mut u8,
            data.len() * mem::size_of::<T>(),
            off,
        )
    }

    /// Reads `size` bytes from offset `off` of the region into `data`.
    pub fn read_bytes(&self, data: *mut u8, size: usize, off: GlobOff) -> Result<(), Error> {
        self.check_bounds(size, off)?;
        let ep = self.activate()?;
        TCU::read(ep, data, size, off)
    }

    /// Reads an object of type `T` from offset `off` of the region.
    pub fn read_obj<T: Default>(&self, off: GlobOff) -> Result<T, Error> {
        let mut obj = T::default();
        let bytes = util::object_to_bytes_mut(&mut obj);
        self.read_bytes(bytes.as_mut_ptr(), bytes.len(), off)?;
        Ok(obj)
    }

    /// Writes `data` to offset `off` of the region.
    pub fn write<T>(&self, data: &[T], off: GlobOff) -> Result<(), Error> {
        self.write_bytes(
            data.as_ptr() as *const u8,
            data.len() * mem::size_of::<T>(),
            off,
        )
    }

    /// Writes `size` bytes from `data` to offset `off` of the region.
    pub fn write_bytes(&self, data: *const u8, size: usize, off: GlobOff) -> Result<(), Error> {
        self.check_bounds(size, off)?;
        let ep = self.activate()?;
        TCU::write(ep, data, size, off)
    }

    /// Writes `obj` to offset `off` of the region.
    pub fn write_obj<T>(&self, obj: &T, off: GlobOff) -> Result<(), Error> {
        let bytes = util::object_to_bytes(obj);
        self.write_bytes(bytes.as_ptr(), bytes.len(), off)
    }

    /// Deactivates the gate, so that the next access binds it to an endpoint again
    pub fn deactivate(&self) {
        self.gate.deactivate();
    }
}

impl Drop for MemGate {
    fn drop(&mut self) {
        if self.resmng && !tiles::is_leaving() {
            if let Some(own) = Activity::try_own() {
                // the resource manager revokes the capability
                self.gate.deactivate();
                if let Ok(rmng) = own.resmng() {
                    rmng.free_mem(self.sel()).ok();
                }
                self.gate.set_flags(CapFlags::KEEP_CAP);
                own.free_sel(self.sel());
            }
        }
    }
}

impl fmt::Debug for MemGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MemGate[sel: {}, size: {:?}, ep: {:?}]",
            self.sel(),
            self.size.get(),
            self.ep()
        )
    }
}
