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

//! The loopback machine
//!
//! The machine consists of a number of tiles, each with an emulated TCU (register file and
//! command engine) and a memory region that is reachable via TCU. Compute tiles host at most one
//! activity, which is executed as a host thread that is bound to the tile. The complete TCU state
//! of all tiles is protected by a single lock, so that all commands are executed atomically.

use std::alloc::{self, Layout};
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use derivative::Derivative;

use crate::cfg;
use crate::env::EnvData;
use crate::errors::{Code, Error};
use crate::io::LogFlags;
use crate::kif::{TileDesc, TileType};
use crate::log;
use crate::mem::GlobOff;
use crate::tcu::{
    EpId, EpReg, EventMask, Header, HeaderFlags, Label, RegKey, Reg, TileId, EP_REGS,
    INVALID_EP, TOTAL_EPS,
};
use crate::util;

use super::engine;

/// The panic payload that is used to leave an activity
///
/// Activities exit by unwinding to the entry of their thread, which reports the contained exit
/// code to the kernel.
#[derive(Debug)]
pub struct ExitRequest(pub Code);

/// The memory of a tile that can be accessed via TCU
pub(crate) struct TileMem {
    base: usize,
    origin: GlobOff,
    size: usize,
    layout: Layout,
}

impl TileMem {
    fn new(origin: GlobOff, size: usize) -> Self {
        let layout = Layout::from_size_align(size.max(cfg::PAGE_SIZE), cfg::PAGE_SIZE)
            .unwrap_or_else(|_| Layout::new::<u64>());
        // safety: the layout has a non-zero size
        let base = unsafe { alloc::alloc_zeroed(layout) } as usize;
        if base == 0 {
            alloc::handle_alloc_error(layout);
        }
        Self {
            base,
            origin,
            size,
            layout,
        }
    }

    /// Translates the TCU-visible address range `addr`..`addr`+`size` to a host address
    pub fn translate(&self, addr: GlobOff, size: usize) -> Option<usize> {
        let off = addr.checked_sub(self.origin)?;
        let end = off.checked_add(size as GlobOff)?;
        if end > self.size as GlobOff {
            return None;
        }
        Some(self.base + off as usize)
    }
}

impl Drop for TileMem {
    fn drop(&mut self) {
        // safety: we allocated the memory with this layout in new
        unsafe { alloc::dealloc(self.base as *mut u8, self.layout) };
    }
}

/// The mutable state of a tile
pub(crate) struct TileState {
    pub desc: TileDesc,
    pub regs: Vec<Reg>,
    pub events: EventMask,
    pub commands: u64,
    pub running: bool,
    pub stop: bool,
}

impl TileState {
    pub fn reg(&self, key: RegKey) -> Reg {
        self.regs[key.index()]
    }

    pub fn set_reg(&mut self, key: RegKey, val: Reg) {
        self.regs[key.index()] = val;
    }

    pub fn ep_regs(&self, ep: EpId) -> [Reg; EP_REGS] {
        [
            self.reg(RegKey::Ep(ep, EpReg::R0)),
            self.reg(RegKey::Ep(ep, EpReg::R1)),
            self.reg(RegKey::Ep(ep, EpReg::R2)),
        ]
    }

    pub fn set_ep_regs(&mut self, ep: EpId, regs: &[Reg; EP_REGS]) {
        self.set_reg(RegKey::Ep(ep, EpReg::R0), regs[0]);
        self.set_reg(RegKey::Ep(ep, EpReg::R1), regs[1]);
        self.set_reg(RegKey::Ep(ep, EpReg::R2), regs[2]);
    }
}

/// The state of the machine that is protected by the machine lock
pub(crate) struct State {
    pub tiles: Vec<TileState>,
    pub exit_ep: Option<(TileId, EpId)>,
    pub shutdown: bool,
}

impl State {
    pub fn tile(&self, tile: TileId) -> Result<&TileState, Error> {
        self.tiles
            .get(tile.tile() as usize)
            .ok_or_else(|| Error::new(Code::InvArgs))
    }

    pub fn tile_mut(&mut self, tile: TileId) -> Result<&mut TileState, Error> {
        self.tiles
            .get_mut(tile.tile() as usize)
            .ok_or_else(|| Error::new(Code::InvArgs))
    }
}

/// The loopback machine
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Machine {
    #[derivative(Debug = "ignore")]
    mems: Vec<TileMem>,
    #[derivative(Debug = "ignore")]
    state: Mutex<State>,
    #[derivative(Debug = "ignore")]
    cond: Condvar,
    start: Instant,
}

/// The binding of a host thread to a tile
pub(crate) struct Binding {
    pub machine: Arc<Machine>,
    pub tile: TileId,
}

thread_local! {
    static BINDING: RefCell<Option<Binding>> = const { RefCell::new(None) };
}

/// Calls `func` with the binding of the current thread, if there is any
pub(crate) fn with_binding<R, F: FnOnce(&Binding) -> R>(func: F) -> Option<R> {
    // the binding might already be gone if thread-local destructors use the TCU
    BINDING
        .try_with(|b| b.borrow().as_ref().map(func))
        .ok()
        .flatten()
}

impl Machine {
    /// Creates a new machine with the given tiles
    ///
    /// The memory of compute tiles covers the activity's environment and receive buffers, starting
    /// at [`ENV_START`](cfg::ENV_START). Memory tiles are addressed from 0.
    pub fn new(tiles: &[TileDesc]) -> Arc<Self> {
        let reg_count = RegKey::Priv(crate::tcu::PrivReg::CurAct).index() + 1;
        let mems = tiles
            .iter()
            .map(|desc| match desc.tile_type() {
                TileType::Mem => TileMem::new(0, desc.mem_size()),
                TileType::Comp => TileMem::new(cfg::ENV_START as GlobOff, cfg::ACT_REGION_SIZE),
            })
            .collect();
        let states = tiles
            .iter()
            .map(|desc| {
                let mut tile = TileState {
                    desc: *desc,
                    regs: vec![0; reg_count],
                    events: EventMask::empty(),
                    commands: 0,
                    running: false,
                    stop: false,
                };
                tile.set_reg(
                    RegKey::Ext(crate::tcu::ExtReg::TileDesc),
                    desc.value(),
                );
                tile
            })
            .collect();

        Arc::new(Self {
            mems,
            state: Mutex::new(State {
                tiles: states,
                exit_ep: None,
                shutdown: false,
            }),
            cond: Condvar::new(),
            start: Instant::now(),
        })
    }

    /// Returns the number of tiles
    pub fn tile_count(&self) -> usize {
        self.mems.len()
    }

    /// Returns the description of the given tile
    pub fn tile_desc(&self, tile: TileId) -> Result<TileDesc, Error> {
        Ok(self.lock().tile(tile)?.desc)
    }

    /// Returns the nanoseconds since the machine was started
    pub fn nanotime(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        // an activity that panicked while holding the lock did not leave the state inconsistent,
        // because all commands are executed completely or not at all
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn mem(&self, tile: TileId) -> Result<&TileMem, Error> {
        self.mems
            .get(tile.tile() as usize)
            .ok_or_else(|| Error::new(Code::InvArgs))
    }

    pub(crate) fn notify(&self) {
        self.cond.notify_all();
    }

    /// Blocks until `cond` returns true, the timeout expires, or the tile is asked to stop
    ///
    /// Returns the state and whether the tile should stop.
    pub(crate) fn wait_until<'s, F>(
        &'s self,
        mut state: MutexGuard<'s, State>,
        tile: TileId,
        timeout: Option<Duration>,
        mut cond: F,
    ) -> (MutexGuard<'s, State>, bool)
    where
        F: FnMut(&State) -> bool,
    {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let stop = state.shutdown || state.tile(tile).map(|t| t.stop).unwrap_or(true);
            if stop {
                return (state, true);
            }
            if cond(&state) {
                return (state, false);
            }

            state = match deadline {
                None => self.cond.wait(state).unwrap_or_else(PoisonError::into_inner),
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return (state, false);
                    }
                    self.cond
                        .wait_timeout(state, d - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                },
            };
        }
    }

    /// Returns the registers of endpoint `ep` on the given tile
    pub fn read_ep_regs(&self, tile: TileId, ep: EpId) -> Result<[Reg; EP_REGS], Error> {
        Self::check_ep(ep)?;
        Ok(self.lock().tile(tile)?.ep_regs(ep))
    }

    /// Configures endpoint `ep` on the given tile
    pub fn set_ep_regs(&self, tile: TileId, ep: EpId, regs: &[Reg; EP_REGS]) -> Result<(), Error> {
        Self::check_ep(ep)?;
        self.lock().tile_mut(tile)?.set_ep_regs(ep, regs);
        Ok(())
    }

    /// Invalidates endpoint `ep` on the given tile
    ///
    /// Without `force`, send endpoints with missing credits are not invalidated. If the
    /// endpoint was valid before, the tile receives the EP_INVAL event.
    pub fn invalidate_ep(&self, tile: TileId, ep: EpId, force: bool) -> Result<(), Error> {
        Self::check_ep(ep)?;
        let res = engine::invalidate_ep(&mut self.lock(), tile, ep, force);
        self.notify();
        res
    }

    /// Reads `buf.len()` bytes at TCU-visible address `addr` of the given tile
    pub fn read_mem(&self, tile: TileId, addr: GlobOff, buf: &mut [u8]) -> Result<(), Error> {
        let _state = self.lock();
        let src = self
            .mem(tile)?
            .translate(addr, buf.len())
            .ok_or_else(|| Error::new(Code::OutOfBounds))?;
        // safety: the source range has been checked and the buffer is valid
        unsafe {
            libc::memcpy(
                buf.as_mut_ptr() as *mut libc::c_void,
                src as *const libc::c_void,
                buf.len(),
            )
        };
        Ok(())
    }

    /// Writes `data` to TCU-visible address `addr` of the given tile
    pub fn write_mem(&self, tile: TileId, addr: GlobOff, data: &[u8]) -> Result<(), Error> {
        let _state = self.lock();
        let dst = self
            .mem(tile)?
            .translate(addr, data.len())
            .ok_or_else(|| Error::new(Code::OutOfBounds))?;
        // safety: the destination range has been checked and the data is valid
        unsafe {
            libc::memcpy(
                dst as *mut libc::c_void,
                data.as_ptr() as *const libc::c_void,
                data.len(),
            )
        };
        Ok(())
    }

    /// Sends a message to receive endpoint `ep` of `tile` whenever an activity exits
    ///
    /// The message contains the raw tile id and the exit code as two words.
    pub fn set_exit_notify(&self, tile: TileId, ep: EpId) {
        self.lock().exit_ep = Some((tile, ep));
    }

    /// Spawns a thread on `tile` that executes `func`
    ///
    /// The result of `func` or the code of an [`ExitRequest`] is the exit code of the thread. If
    /// an exit notification endpoint has been set, the code is reported to it.
    pub fn spawn<F>(
        self: &Arc<Self>,
        tile: TileId,
        name: &str,
        func: F,
    ) -> Result<thread::JoinHandle<Code>, Error>
    where
        F: FnOnce() -> Result<(), Error> + Send + 'static,
    {
        {
            let mut state = self.lock();
            let ts = state.tile_mut(tile)?;
            if ts.running {
                return Err(Error::new(Code::Exists));
            }
            ts.running = true;
            ts.stop = false;
        }

        let machine = self.clone();
        thread::Builder::new()
            .name(String::from(name))
            .spawn(move || {
                BINDING.with(|b| {
                    b.replace(Some(Binding {
                        machine: machine.clone(),
                        tile,
                    }))
                });

                let code = match panic::catch_unwind(AssertUnwindSafe(func)) {
                    Ok(res) => Code::from(res),
                    Err(payload) => match payload.downcast::<ExitRequest>() {
                        Ok(req) => req.0,
                        Err(_) => Code::Unspecified,
                    },
                };

                machine.exited(tile, code);
                BINDING.with(|b| b.replace(None));
                code
            })
            .map_err(|_| Error::new(Code::OutOfMem))
    }

    /// Starts the activity on `tile` according to the environment in the tile's memory
    ///
    /// The environment's entry field contains the address of a function of this program that
    /// initializes the runtime and calls the activity's main function.
    pub fn start_activity(self: &Arc<Self>, tile: TileId, name: &str) -> Result<(), Error> {
        let mut env = EnvData::default();
        self.read_mem(
            tile,
            cfg::ENV_START as GlobOff,
            util::object_to_bytes_mut(&mut env),
        )?;
        if env.entry == 0 {
            return Err(Error::new(Code::InvArgs));
        }

        // safety: the entry has been set by the runtime of this program to a fn()
        let entry: fn() = unsafe { core::mem::transmute(env.entry as usize) };
        self.spawn(tile, name, move || {
            entry();
            Ok(())
        })
        .map(|_| ())
    }

    /// Asks the activity on `tile` to stop
    ///
    /// The activity leaves as soon as it blocks in the TCU.
    pub fn stop_activity(&self, tile: TileId) -> Result<(), Error> {
        let mut state = self.lock();
        let ts = state.tile_mut(tile)?;
        if ts.running {
            ts.stop = true;
        }
        drop(state);
        self.notify();
        Ok(())
    }

    /// Stops all activities that block in the TCU
    pub fn shutdown(&self) {
        self.lock().shutdown = true;
        self.notify();
    }

    fn exited(&self, tile: TileId, code: Code) {
        let mut state = self.lock();
        if let Ok(ts) = state.tile_mut(tile) {
            ts.running = false;
            ts.stop = false;
            ts.events = EventMask::empty();
        }

        log!(
            LogFlags::TCU,
            "tile {} exited with {:?}",
            tile,
            code
        );

        if let Some((ktile, kep)) = state.exit_ep {
            let payload = [tile.raw() as u64, code as u64];
            let header = Header::new(
                HeaderFlags::empty(),
                0,
                tile,
                INVALID_EP,
                INVALID_EP,
                16,
                0,
                tile.raw() as Label,
            );
            if let Err(e) =
                engine::deliver(self, &mut state, ktile, kep, &header, util::object_to_bytes(&payload))
            {
                log!(
                    LogFlags::TCUErr,
                    "unable to report exit of {}: {:?}",
                    tile,
                    e
                );
            }
        }

        drop(state);
        self.notify();
    }

    fn check_ep(ep: EpId) -> Result<(), Error> {
        if ep >= TOTAL_EPS {
            return Err(Error::new(Code::InvEP));
        }
        Ok(())
    }
}
