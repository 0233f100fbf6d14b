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

use crate::errors::{Code, Error};
use crate::kif::{self, syscalls::ActivityOp};
use crate::syscalls;
use crate::tiles::{self, Activity, ChildActivity};
use crate::upcalls;

/// Represents an activity that has been started
pub trait RunningActivity {
    /// Returns a reference to the activity.
    fn activity(&self) -> &ChildActivity;
    /// Returns a mutable reference to the activity.
    fn activity_mut(&mut self) -> &mut ChildActivity;

    /// Starts the activity.
    fn start(&self) -> Result<(), Error> {
        syscalls::activity_ctrl(self.activity().sel(), ActivityOp::Start, 0)
    }

    /// Stops the activity.
    fn stop(&self) -> Result<(), Error> {
        syscalls::activity_ctrl(self.activity().sel(), ActivityOp::Stop, 0)
    }

    /// Waits until the activity exits and returns its exit code.
    fn wait(&self) -> Result<Code, Error> {
        syscalls::activity_wait(&[self.activity().sel()], 0).map(|r| r.1)
    }

    /// Waits until the activity exits via an upcall with given event and returns its exit code.
    ///
    /// In contrast to [`wait`](RunningActivity::wait), the kernel confirms the wait immediately
    /// and delivers the result later by an upcall, so that the syscall channel stays usable in the
    /// meantime.
    fn wait_async(&self, event: u64) -> Result<Code, Error> {
        let (sel, code) = syscalls::activity_wait(&[self.activity().sel()], event)?;
        if sel != kif::INVALID_SEL {
            return Ok(code);
        }
        upcalls::wait(event).map(|r| r.1)
    }
}

fn stop_on_drop(act: &dyn RunningActivity) {
    if !tiles::is_leaving() && Activity::try_own().is_some() {
        act.stop().ok();
    }
}

/// The activity for [`ChildActivity::start`].
pub struct RunningDeviceActivity {
    act: ChildActivity,
}

impl RunningDeviceActivity {
    /// Creates a new `RunningDeviceActivity` for the given activity.
    pub fn new(act: ChildActivity) -> Self {
        Self { act }
    }
}

impl RunningActivity for RunningDeviceActivity {
    fn activity(&self) -> &ChildActivity {
        &self.act
    }

    fn activity_mut(&mut self) -> &mut ChildActivity {
        &mut self.act
    }
}

impl Drop for RunningDeviceActivity {
    fn drop(&mut self) {
        stop_on_drop(self);
    }
}

/// The activity for [`ChildActivity::run`] and [`ChildActivity::exec`].
pub struct RunningProgramActivity {
    act: ChildActivity,
}

impl RunningProgramActivity {
    /// Creates a new `RunningProgramActivity` for the given activity.
    pub fn new(act: ChildActivity) -> Self {
        Self { act }
    }
}

impl RunningActivity for RunningProgramActivity {
    fn activity(&self) -> &ChildActivity {
        &self.act
    }

    fn activity_mut(&mut self) -> &mut ChildActivity {
        &mut self.act
    }
}

impl Drop for RunningProgramActivity {
    fn drop(&mut self) {
        stop_on_drop(self);
    }
}
