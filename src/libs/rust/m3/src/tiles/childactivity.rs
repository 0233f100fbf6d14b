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

//! Contains the abstraction for child activities

use core::cmp;
use core::fmt;
use core::mem;
use core::ops::{Deref, DerefMut};

use cfg_if::cfg_if;

use crate::cap::{CapFlags, Capability, Selector};
use crate::cell::Cell;
use crate::cfg;
use crate::client::ResMng;
use crate::col::{String, ToString, Vec};
use crate::env::{self, EnvBuilder, EnvData, Lambda};
use crate::errors::{Code, Error};
use crate::io::LogFlags;
use crate::kif::{self, CapRngDesc, CapType, Perm};
use crate::log;
use crate::mem::GlobOff;
use crate::rc::Rc;
use crate::serialize::{M3Serializer, VecSink};
use crate::syscalls;
use crate::tiles::{Activity, KMem, RunningDeviceActivity, RunningProgramActivity, Tile};
use crate::vfs::Fd;

/// The arguments for [`ChildActivity`] creations.
pub struct ActivityArgs<'n> {
    name: &'n str,
    kmem: Option<Rc<KMem>>,
    rmng: Option<ResMng>,
}

impl<'n> ActivityArgs<'n> {
    /// Creates a new instance of `ActivityArgs` using default settings.
    pub fn new(name: &'n str) -> ActivityArgs<'n> {
        ActivityArgs {
            name,
            kmem: None,
            rmng: None,
        }
    }

    /// Sets the resource manager to `rmng`. Otherwise and by default, the resource manager of the
    /// own activity will be cloned.
    pub fn resmng(mut self, rmng: ResMng) -> Self {
        self.rmng = Some(rmng);
        self
    }

    /// Sets the kernel memory to use for the activity. By default, the kernel memory of the own
    /// activity will be used.
    pub fn kmem(mut self, kmem: Rc<KMem>) -> Self {
        self.kmem = Some(kmem);
        self
    }
}

/// A sink for the activity-local data of a [`ChildActivity`]
///
/// The sink replaces the previous data with everything pushed into it once it is dropped.
pub struct DataSink<'a> {
    ser: M3Serializer<VecSink>,
    data: &'a mut Vec<u64>,
}

impl Deref for DataSink<'_> {
    type Target = M3Serializer<VecSink>;

    fn deref(&self) -> &Self::Target {
        &self.ser
    }
}

impl DerefMut for DataSink<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.ser
    }
}

impl Drop for DataSink<'_> {
    fn drop(&mut self) {
        let ser = mem::replace(&mut self.ser, M3Serializer::new(VecSink::new()));
        *self.data = ser.into_sink().into_vec();
    }
}

/// Represents a child activity.
///
/// A child activity is created on a [`Tile`] and configured before it is started: capabilities
/// can be exchanged with it, files and mount points of the own activity can be installed, and
/// activity-local data can be passed via [`data_sink`](ChildActivity::data_sink). All of that is
/// transferred to the child when it is started via [`run`](ChildActivity::run) or
/// [`exec`](ChildActivity::exec).
pub struct ChildActivity {
    base: Activity,
    child_sel: Cell<Selector>,
    rmng_sel: Selector,
    files: Vec<(Fd, Fd)>,
    mounts: Vec<(String, String)>,
}

impl ChildActivity {
    /// Creates a new [`ChildActivity`] on tile `tile` with given name and default settings. The
    /// activity provides access to the tile and allows to run an activity on the tile.
    pub fn new(tile: Rc<Tile>, name: &str) -> Result<Self, Error> {
        Self::new_with(tile, ActivityArgs::new(name))
    }

    /// Creates a new [`ChildActivity`] on tile `tile` with given arguments. The activity provides
    /// access to the tile and allows to run an activity on the tile.
    pub fn new_with(tile: Rc<Tile>, args: ActivityArgs<'_>) -> Result<Self, Error> {
        let own = Activity::own();
        let sel = own.alloc_sel();

        let mut act = ChildActivity {
            base: Activity::new_act(
                Capability::new(sel, CapFlags::empty()),
                tile.clone(),
                args.kmem.unwrap_or_else(|| own.kmem().clone()),
            ),
            child_sel: Cell::new(kif::FIRST_FREE_SEL),
            rmng_sel: kif::INVALID_SEL,
            files: Vec::new(),
            mounts: Vec::new(),
        };

        let (id, eps_start) =
            syscalls::create_activity(sel, args.name, tile.sel(), act.kmem().sel())?;
        act.id = id;
        act.eps_start = eps_start;

        // determine resource manager
        let resmng = if let Some(rmng) = args.rmng {
            act.delegate_obj(rmng.sel())?;
            act.rmng_sel = rmng.sel();
            rmng
        }
        else {
            let sgate_sel = own.alloc_sel();
            let rmng = own.resmng()?.clone(id, sel, sgate_sel, args.name)?;
            act.rmng_sel = act.child_sel.get();
            act.delegate_to(
                CapRngDesc::new(CapType::Object, sgate_sel, 1),
                act.rmng_sel,
            )?;
            rmng
        };
        act.rmng = Some(resmng);

        // ensure that the child's cap space is not further ahead than ours
        own.sels().ensure_above(act.child_sel.get());

        log!(
            LogFlags::Debug,
            "Created {:?} with eps_start={}, rmng={}",
            act,
            eps_start,
            act.rmng_sel
        );
        Ok(act)
    }

    /// Returns the selector of the resource manager within the child
    pub fn resmng_sel(&self) -> Selector {
        self.rmng_sel
    }

    /// Returns the first selector that is not yet used in the child
    pub fn child_sel(&self) -> Selector {
        self.child_sel.get()
    }

    /// Returns the map of files (destination fd, source fd) that are going to be delegated to this
    /// child activity on [`run`](ChildActivity::run) and [`exec`](ChildActivity::exec).
    pub fn files(&self) -> &[(Fd, Fd)] {
        &self.files
    }

    /// Returns the map of mounts (destination path, source path) that are going to be delegated to
    /// this child activity on [`run`](ChildActivity::run) and [`exec`](ChildActivity::exec).
    pub fn mounts(&self) -> &[(String, String)] {
        &self.mounts
    }

    /// Installs file `our_fd` as `child_fd` in this child activity.
    ///
    /// Files that are added to child activities are automatically delegated to the child upon
    /// [`run`](ChildActivity::run) and [`exec`](ChildActivity::exec).
    pub fn add_file(&mut self, child_fd: Fd, our_fd: Fd) {
        if let Some(mapping) = self.files.iter_mut().find(|(c, _p)| *c == child_fd) {
            mapping.1 = our_fd;
        }
        else {
            self.files.push((child_fd, our_fd));
        }
    }

    /// Installs mount `our_path` as `child_path` in this child activity.
    ///
    /// Mounts that are added to child activities are automatically delegated to the child upon
    /// [`run`](ChildActivity::run) and [`exec`](ChildActivity::exec).
    pub fn add_mount(&mut self, child_path: &str, our_path: &str) {
        if let Some(mapping) = self.mounts.iter_mut().find(|(c, _p)| c == child_path) {
            mapping.1 = our_path.to_string();
        }
        else {
            self.mounts
                .push((child_path.to_string(), our_path.to_string()))
        }
    }

    /// Returns a sink for the activity-local data
    ///
    /// The sink overwrites the activity-local data and will be transmitted to the activity when
    /// calling [`run`](ChildActivity::run) and [`exec`](ChildActivity::exec). The data must not
    /// exceed [`MAX_DATA_SIZE`](cfg::MAX_DATA_SIZE) bytes.
    pub fn data_sink(&mut self) -> DataSink<'_> {
        DataSink {
            ser: M3Serializer::new(VecSink::new()),
            data: &mut self.base.data,
        }
    }

    /// Delegates the object capability with selector `sel` of [`Activity::own`](Activity::own) to
    /// `self`.
    pub fn delegate_obj(&self, sel: Selector) -> Result<(), Error> {
        self.delegate(CapRngDesc::new(CapType::Object, sel, 1))
    }

    /// Delegates the given capability range of [`Activity::own`](Activity::own) to `self`.
    pub fn delegate(&self, crd: CapRngDesc) -> Result<(), Error> {
        let start = crd.start();
        self.delegate_to(crd, start)
    }

    /// Delegates the given capability range of [`Activity::own`](Activity::own) to `self` using
    /// selectors `dst`..`dst`+`crd.count()`.
    pub fn delegate_to(&self, crd: CapRngDesc, dst: Selector) -> Result<(), Error> {
        syscalls::exchange(self.sel(), crd, dst, false)?;
        self.child_sel
            .set(cmp::max(self.child_sel.get(), dst + crd.count()));
        Ok(())
    }

    /// Obtains the object capability with selector `sel` from `self` to
    /// [`Activity::own`](Activity::own).
    pub fn obtain_obj(&self, sel: Selector) -> Result<Selector, Error> {
        self.obtain(CapRngDesc::new(CapType::Object, sel, 1))
    }

    /// Obtains the given capability range of `self` to [`Activity::own`](Activity::own).
    pub fn obtain(&self, crd: CapRngDesc) -> Result<Selector, Error> {
        let count = crd.count();
        let start = Activity::own().alloc_sels(count);
        self.obtain_to(crd, start).map(|_| start)
    }

    /// Obtains the given capability range of `self` to [`Activity::own`](Activity::own) using
    /// selectors `dst`..`dst`+`crd.count()`.
    pub fn obtain_to(&self, crd: CapRngDesc, dst: Selector) -> Result<(), Error> {
        let own = CapRngDesc::new(crd.cap_type(), dst, crd.count());
        syscalls::exchange(self.sel(), own, crd.start(), true)
    }

    /// Starts the activity without running any code on it. This is intended for non-programmable
    /// accelerators and devices that get started, but don't execute any code.
    pub fn start(self) -> Result<RunningDeviceActivity, Error> {
        use crate::tiles::RunningActivity;

        let act = RunningDeviceActivity::new(self);
        act.start().map(|_| act)
    }

    /// Runs `func` in this activity with the arguments of the own activity.
    ///
    /// The child executes the program of the own activity and calls `func` instead of its main
    /// function. The result of `func` becomes the exit code of the child.
    ///
    /// The method returns the [`RunningProgramActivity`] on success that can be used to wait for
    /// the function's completion or to stop it.
    pub fn run(self, func: Lambda) -> Result<RunningProgramActivity, Error> {
        let args = env::args().collect::<Vec<_>>();
        self.run_with_args(func, &args)
    }

    /// Like [`run`](ChildActivity::run), but passes `args` as arguments to the child
    ///
    /// On loopback, this is also the way to start a program with given arguments, because
    /// [`exec`](ChildActivity::exec) is not supported there.
    pub fn run_with_args<S: AsRef<str>>(
        self,
        func: Lambda,
        args: &[S],
    ) -> Result<RunningProgramActivity, Error> {
        cfg_if! {
            if #[cfg(feature = "loopback")] {
                // all activities live in the same program
                let entry = env::env_run as usize;
            }
            else {
                let entry = self.load_program_file(args)?;
            }
        }

        self.load_environment(args, entry, func as usize)?;
        self.start_program()
    }

    /// Executes the given program and arguments with `self`.
    ///
    /// The program is loaded from the file `args[0]`. Loading programs is not supported on
    /// loopback, where the call fails with [`NotSup`](Code::NotSup).
    ///
    /// The method returns the [`RunningProgramActivity`] on success that can be used to wait for
    /// the program completeness or to stop it.
    pub fn exec<S: AsRef<str>>(self, args: &[S]) -> Result<RunningProgramActivity, Error> {
        cfg_if! {
            if #[cfg(feature = "loopback")] {
                let _ = args;
                Err(Error::new(Code::NotSup))
            }
            else {
                let entry = self.load_program_file(args)?;
                self.load_environment(args, entry, 0)?;
                self.start_program()
            }
        }
    }

    #[cfg(not(feature = "loopback"))]
    fn load_program_file<S: AsRef<str>>(&self, args: &[S]) -> Result<usize, Error> {
        use crate::tiles::load_program;
        use crate::vfs::{OpenFlags, VFS};

        let path = args.first().ok_or_else(|| Error::new(Code::InvArgs))?;
        let mut file = VFS::open(path.as_ref(), OpenFlags::RX)?;
        load_program(self, &mut file).map(|entry| entry as usize)
    }

    fn start_program(self) -> Result<RunningProgramActivity, Error> {
        use crate::tiles::RunningActivity;

        let act = RunningProgramActivity::new(self);
        act.start().map(|_| act)
    }

    fn load_environment<S: AsRef<str>>(
        &self,
        args: &[S],
        entry: usize,
        lambda: usize,
    ) -> Result<(), Error> {
        if self.data.len() * mem::size_of::<u64>() > cfg::MAX_DATA_SIZE {
            return Err(Error::new(Code::InvArgs));
        }

        let own = Activity::own();
        // the delegations determine the first free selector of the child
        own.files().delegate(self)?;
        own.mounts().delegate(self)?;

        let mut builder = EnvBuilder::new();

        let mut fds = M3Serializer::new(VecSink::new());
        own.files().serialize(&self.files, &mut fds);
        let (fds_addr, fds_len) = builder.push_words(fds.words());

        let mut mounts = M3Serializer::new(VecSink::new());
        own.mounts().serialize(&self.mounts, &mut mounts);
        let (mounts_addr, mounts_len) = builder.push_words(mounts.words());

        let (data_addr, data_len) = builder.push_words(&self.data);
        let argv = builder.push_strings(args.iter().map(|a| a.as_ref()));
        let envp = builder.push_strings(env::vars());
        builder.check()?;

        let senv = EnvData {
            platform: env::get().platform,
            tile_id: self.tile_id().raw() as u64,
            tile_desc: self.tile_desc().value(),
            argc: args.len() as u32,
            argv,
            envp,
            heap_size: cfg::MOD_HEAP_SIZE as u64,
            sp: self.tile_desc().stack_top() as u64,
            entry: entry as u64,
            first_std_ep: self.eps_start,
            first_sel: self.child_sel.get(),
            act_id: self.id() as u32,
            rmng_sel: self.rmng_sel,
            pager_sess: kif::INVALID_SEL,
            pager_sgate: kif::INVALID_SEL,
            mounts_addr,
            mounts_len,
            fds_addr,
            fds_len,
            data_addr,
            data_len,
            lambda: lambda as u64,
        };

        log!(
            LogFlags::Debug,
            "Loading environment of {:?}: argc={}, files={:?}, mounts={:?}, data={}b",
            self,
            args.len(),
            self.files,
            self.mounts,
            data_len
        );

        let mem = self.get_mem(
            cfg::ENV_START as GlobOff,
            cfg::ENV_SIZE as GlobOff,
            Perm::W,
        )?;
        mem.write_obj(&senv, 0)?;
        if !builder.bytes().is_empty() {
            mem.write(
                builder.bytes(),
                (builder.start() - cfg::ENV_START) as GlobOff,
            )?;
        }
        Ok(())
    }
}

impl Deref for ChildActivity {
    type Target = Activity;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl DerefMut for ChildActivity {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

impl fmt::Debug for ChildActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "ChildActivity[id: {}, sel: {}, tile: {:?}]",
            self.id(),
            self.sel(),
            self.tile()
        )
    }
}
