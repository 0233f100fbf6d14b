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

//! The loopback platform the kernel runs on
//!
//! A [`Machine`] consists of the kernel tile, a number of compute tiles, and one memory tile. The
//! kernel runs as a host thread on tile 0 and starts the root activity on the first compute
//! tile. Boot modules are placed at the beginning of the memory tile; the remaining memory is
//! handed out by the resource manager.

use base::cfg;
use base::col::{String, Vec};
use base::errors::{Code, Error};
use base::io::{self, LogFlags};
use base::kif::{TileAttr, TileDesc, TileISA, TileType};
use base::log;
use base::loopback;
use base::mem::GlobOff;
use base::sync::Arc;
use base::tcu::TileId;
use base::util::math;

use crate::ktcu;
use crate::mem::{BootModule, MainMemory};
use crate::state::Kernel;
use crate::tiles::{self, RootEntry, TileMng};
use crate::workloop;

/// The tile the kernel runs on
pub const KERNEL_TILE: TileId = TileId::new(0, 0);

/// The configuration of a loopback machine
#[derive(Clone, Debug)]
pub struct MachineConfig {
    tiles: usize,
    mem_size: usize,
    kmem: usize,
    mods: Vec<(String, Vec<u8>)>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            tiles: 4,
            mem_size: 16 * 1024 * 1024,
            kmem: cfg::FIXED_KMEM,
            mods: Vec::new(),
        }
    }
}

impl MachineConfig {
    /// Sets the number of compute tiles for activities
    pub fn tiles(mut self, count: usize) -> Self {
        self.tiles = count;
        self
    }

    /// Sets the size of the memory tile
    pub fn mem_size(mut self, size: usize) -> Self {
        self.mem_size = size;
        self
    }

    /// Sets the kernel memory quota of the root activity
    pub fn kmem(mut self, size: usize) -> Self {
        self.kmem = size;
        self
    }

    /// Adds a boot module with given name and content
    pub fn boot_mod(mut self, name: &str, data: &[u8]) -> Self {
        self.mods.push((String::from(name), data.to_vec()));
        self
    }

    /// Returns the descriptions of all tiles, starting with the kernel tile
    pub fn tile_descs(&self) -> Vec<TileDesc> {
        let comp = TileDesc::new_with_attr(
            TileType::Comp,
            TileISA::X86,
            cfg::ACT_REGION_SIZE,
            TileAttr::IMEM,
        );
        let mut descs = vec![comp; self.tiles + 1];
        descs.push(TileDesc::new(TileType::Mem, TileISA::None, self.mem_size));
        descs
    }
}

/// A loopback machine that runs the kernel and a root activity
pub struct Machine {
    cfg: MachineConfig,
    machine: Arc<loopback::Machine>,
}

impl Machine {
    pub fn new(cfg: MachineConfig) -> Self {
        let machine = loopback::Machine::new(&cfg.tile_descs());
        Self { cfg, machine }
    }

    /// Returns the underlying machine
    pub fn machine(&self) -> &Arc<loopback::Machine> {
        &self.machine
    }

    /// Boots the kernel, runs the root activity, and returns its exit code
    ///
    /// `entry` is the runtime's entry function and `lambda` the function the root activity
    /// executes. All remaining activities are stopped as soon as the root activity exited.
    pub fn run(self, entry: fn(), lambda: usize) -> Code {
        let descs = self.cfg.tile_descs();
        let mem_tile = TileId::new(0, (descs.len() - 1) as u8);

        let mods = match load_mods(&self.machine, mem_tile, &self.cfg.mods) {
            Ok(mods) => mods,
            Err(e) => return e.code(),
        };
        let mods_end = mods
            .last()
            .map(|m| math::round_up(m.addr() + m.size(), cfg::PAGE_SIZE as GlobOff))
            .unwrap_or(0);
        if mods_end >= self.cfg.mem_size as GlobOff {
            return Code::NoSpace;
        }

        let root = RootEntry {
            entry: entry as usize,
            lambda,
        };
        let kmem = self.cfg.kmem;
        let mem_size = self.cfg.mem_size as GlobOff;
        let machine = self.machine.clone();
        let kernel = self.machine.spawn(KERNEL_TILE, "kernel", move || {
            io::init(KERNEL_TILE, "kernel");
            ktcu::init();
            machine.set_exit_notify(KERNEL_TILE, ktcu::KTMUX_EP);

            let tiles = TileMng::new(&descs, KERNEL_TILE);
            let mem = MainMemory::new(mem_tile, mods_end, mem_size - mods_end);
            let mut k = Kernel::new(machine.clone(), tiles, mem, mods);

            let code = match tiles::create_root(&mut k, root, kmem) {
                Ok(id) => {
                    log!(LogFlags::KernActs, "Started root activity {}", id);
                    workloop::workloop(&mut k)
                },
                Err(e) => {
                    log!(LogFlags::Error, "Unable to create root activity: {:?}", e);
                    e.code()
                },
            };
            log!(LogFlags::Info, "Root activity exited with {:?}", code);

            machine.shutdown();
            Result::from(code)
        });

        match kernel {
            Ok(handle) => handle.join().unwrap_or(Code::Unspecified),
            Err(e) => e.code(),
        }
    }
}

fn load_mods(
    machine: &loopback::Machine,
    tile: TileId,
    mods: &[(String, Vec<u8>)],
) -> Result<Vec<BootModule>, Error> {
    let mut res = Vec::new();
    let mut addr: GlobOff = 0;
    for (name, data) in mods {
        machine.write_mem(tile, addr, data)?;
        res.push(BootModule::new(name, tile, addr, data.len() as GlobOff));
        addr = math::round_up(addr + data.len() as GlobOff, cfg::PAGE_SIZE as GlobOff);
    }
    Ok(res)
}
