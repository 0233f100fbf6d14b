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

//! Contains the own activity

use core::fmt;
use core::ops::Deref;

use crate::cap::{CapFlags, Capability, SelSpace, Selector};
use crate::cell::{RefCell, RefMut};
use crate::cfg;
use crate::client::ResMng;
use crate::col::BTreeMap;
use crate::com::{EpMng, RecvBufs, RecvGate, SendGate};
use crate::env;
use crate::errors::{Code, Error};
use crate::io::LogFlags;
use crate::kif::{self, TileDesc};
use crate::log;
use crate::rc::Rc;
use crate::serialize::M3Deserializer;
use crate::tcu::{self, EpId, TileId};
use crate::tiles::{Activity, KMem, Tile};
use crate::time::TimeDuration;
use crate::tmif;
use crate::vfs::{FileTable, MountTable};

/// Represents the own activity
///
/// The own activity provides access to the resources associated with this activity: the capability
/// selector space, the endpoint manager, the receive-buffer space, the standard gates, and the
/// resource manager. Additionally, it holds the resources that can be transferred to
/// [`ChildActivity`](`crate::tiles::ChildActivity`)s: files, mount points, and data.
///
/// Besides that, [`OwnActivity`] offers operations regarding the execution of the own activity
/// such as [`sleep`](`OwnActivity::sleep`), [`wait_for`](`OwnActivity::wait_for`), and
/// [`exit`](`OwnActivity::exit`).
pub struct OwnActivity {
    base: Activity,
    sels: SelSpace,
    epmng: RefCell<EpMng>,
    rbufs: RefCell<RecvBufs>,
    sysc_sgate: SendGate,
    sysc_rgate: RecvGate,
    upcall_rgate: RecvGate,
    def_rgate: RecvGate,
    upcalls: RefCell<BTreeMap<u64, (Selector, Code)>>,
    files: RefCell<FileTable>,
    mounts: RefCell<MountTable>,
}

impl OwnActivity {
    pub(crate) fn new() -> Self {
        let env = env::get();
        let eps_start = env.first_std_ep;
        let rbuf = cfg::RBUF_STD_ADDR;
        let upcall_buf = rbuf + cfg::SYSC_RBUF_SIZE;
        let def_buf = upcall_buf + cfg::UPCALL_RBUF_SIZE;

        let rmng = match env.rmng_sel {
            kif::INVALID_SEL => None,
            sel => Some(ResMng::new(SendGate::new_bind(sel))),
        };

        OwnActivity {
            base: Activity {
                id: env.act_id as tcu::ActId,
                rmng,
                cap: Capability::new(kif::SEL_ACT, CapFlags::KEEP_CAP),
                tile: Rc::new(Tile::new_bind(
                    TileId::new_from_raw(env.tile_id as u16),
                    TileDesc::new_from(env.tile_desc),
                    kif::SEL_TILE,
                )),
                kmem: Rc::new(KMem::new_bind(kif::SEL_KMEM)),
                eps_start,
                data: env::region_words(env.data_addr, env.data_len).to_vec(),
            },
            sels: SelSpace::new(env.first_sel),
            epmng: RefCell::new(EpMng::default()),
            rbufs: RefCell::new(RecvBufs::new(cfg::RBUF_ADDR, cfg::RBUF_SIZE)),
            sysc_sgate: SendGate::new_def(eps_start + tcu::SYSC_SEP_OFF),
            sysc_rgate: RecvGate::new_def(
                eps_start + tcu::SYSC_REP_OFF,
                rbuf,
                cfg::SYSC_RBUF_ORD,
                cfg::SYSC_RBUF_ORD,
            ),
            upcall_rgate: RecvGate::new_def(
                eps_start + tcu::UPCALL_REP_OFF,
                upcall_buf,
                cfg::UPCALL_RBUF_ORD,
                cfg::UPCALL_RBUF_MSG_ORD,
            ),
            def_rgate: RecvGate::new_def(
                eps_start + tcu::DEF_REP_OFF,
                def_buf,
                cfg::DEF_RBUF_ORD,
                cfg::DEF_RBUF_MSG_ORD,
            ),
            upcalls: RefCell::new(BTreeMap::new()),
            files: RefCell::new(FileTable::default()),
            mounts: RefCell::new(MountTable::default()),
        }
    }

    pub(crate) fn load_env(&self) -> Result<(), Error> {
        let env = env::get();

        // mounts first; files might refer to them
        let words = env::region_words(env.mounts_addr, env.mounts_len);
        if !words.is_empty() {
            let mounts = MountTable::unserialize(&mut M3Deserializer::new(words))?;
            self.mounts.replace(mounts);
        }

        let words = env::region_words(env.fds_addr, env.fds_len);
        if !words.is_empty() {
            let files = FileTable::unserialize(&mut M3Deserializer::new(words))?;
            self.files.replace(files);
        }

        log!(
            LogFlags::Debug,
            "Initialized {:?} with first_sel={}, mounts={:?}, files={:?}",
            self,
            env.first_sel,
            self.mounts.borrow(),
            self.files.borrow()
        );
        Ok(())
    }

    /// Closes all files and exits with given result
    pub fn exit(res: Result<(), Error>) -> ! {
        Self::exit_with(Code::from(res));
    }

    /// Closes all files and exits with given code
    pub fn exit_with(code: Code) -> ! {
        if let Some(own) = Activity::try_own() {
            // files might need to tell their peers that we're gone
            let files = own.files.replace(FileTable::default());
            drop(files);
        }
        tmif::exit(code);
    }

    /// Puts the own activity to sleep until the next event arrives
    pub fn sleep() -> Result<(), Error> {
        Self::wait_for(None, None, None)
    }

    /// Puts the own activity to sleep until the next event arrives or `timeout` time has passed.
    pub fn sleep_for(timeout: TimeDuration) -> Result<(), Error> {
        Self::wait_for(None, None, Some(timeout))
    }

    /// Puts the own activity to sleep until the next message arrives on the given EP, the given
    /// interrupt occurs, or `timeout` time has passed.
    ///
    /// Without EP, any event wakes the activity up. A timeout is not reported as an error.
    pub fn wait_for(
        ep: Option<EpId>,
        irq: Option<tmif::IRQId>,
        timeout: Option<TimeDuration>,
    ) -> Result<(), Error> {
        match tmif::wait(ep, irq, timeout) {
            Err(e) if e.code() == Code::Timeout => Ok(()),
            res => res,
        }
    }

    /// Allocates a new capability selector
    pub fn alloc_sel(&self) -> Selector {
        self.sels.alloc_sel()
    }

    /// Allocates `count` consecutive capability selectors and returns the first one
    pub fn alloc_sels(&self, count: u64) -> Selector {
        self.sels.alloc_sels(count)
    }

    /// Gives the capability selector `sel` back
    pub fn free_sel(&self, sel: Selector) {
        self.sels.free_sel(sel);
    }

    pub(crate) fn sels(&self) -> &SelSpace {
        &self.sels
    }

    /// Returns a mutable reference to the file table of this activity.
    pub fn files(&self) -> RefMut<'_, FileTable> {
        self.files.borrow_mut()
    }

    /// Returns a mutable reference to the mount table of this activity.
    pub fn mounts(&self) -> RefMut<'_, MountTable> {
        self.mounts.borrow_mut()
    }

    /// Returns a source for the activity-local data
    ///
    /// The source provides access to the activity-local data that has been transmitted to this
    /// activity from its parent during [`ChildActivity::run`](crate::tiles::ChildActivity::run).
    pub fn data_source(&self) -> M3Deserializer<'_> {
        M3Deserializer::new(&self.data)
    }

    /// Returns a mutable reference to the endpoint manager
    pub fn epmng_mut(&self) -> RefMut<'_, EpMng> {
        self.epmng.borrow_mut()
    }

    /// Returns a mutable reference to the receive-buffer allocator
    pub fn rbufs_mut(&self) -> RefMut<'_, RecvBufs> {
        self.rbufs.borrow_mut()
    }

    /// Returns the send gate for system calls
    pub fn syscall_sgate(&self) -> &SendGate {
        &self.sysc_sgate
    }

    /// Returns the receive gate for system-call replies
    pub fn syscall_rgate(&self) -> &RecvGate {
        &self.sysc_rgate
    }

    /// Returns the receive gate for upcalls
    pub fn upcall_rgate(&self) -> &RecvGate {
        &self.upcall_rgate
    }

    /// Returns the default receive gate, which is used to receive replies
    pub fn def_rgate(&self) -> &RecvGate {
        &self.def_rgate
    }

    pub(crate) fn upcall_results(&self) -> RefMut<'_, BTreeMap<u64, (Selector, Code)>> {
        self.upcalls.borrow_mut()
    }

    /// Returns a reference to the activity's resource manager.
    pub fn resmng(&self) -> Result<&ResMng, Error> {
        self.rmng.as_ref().ok_or_else(|| Error::new(Code::NotSup))
    }
}

impl Deref for OwnActivity {
    type Target = Activity;

    fn deref(&self) -> &<Self as Deref>::Target {
        &self.base
    }
}

impl fmt::Debug for OwnActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "OwnActivity[id: {}, sel: {}, tile: {:?}]",
            self.id(),
            self.sel(),
            self.tile()
        )
    }
}
