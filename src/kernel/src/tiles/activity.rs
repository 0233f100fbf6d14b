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

use base::col::{String, Vec};
use base::errors::Code;
use base::kif::CapSel;
use base::rc::Rc;
use base::tcu::{ActId, EpId, Message, TileId};
use bitflags::bitflags;

use core::fmt;

use crate::cap::{KMemObject, TileObject};

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct ActFlags : u32 {
        const IS_ROOT = 1;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum State {
    /// Created, but not started yet
    Init,
    Running,
    Dead,
}

/// A pending wait of an activity for the exit of other activities
pub struct ExitWait {
    /// The selectors of the activities that are waited for
    pub sels: Vec<CapSel>,
    /// The event for the upcall (0 for a synchronous wait)
    pub event: u64,
    /// The syscall to reply to when a synchronous wait finishes
    pub msg: Option<&'static Message>,
}

pub struct Activity {
    id: ActId,
    name: String,
    flags: ActFlags,
    tile: Rc<TileObject>,
    kmem: Rc<KMemObject>,
    eps_start: EpId,
    state: State,
    exit_code: Option<Code>,
    wait: Option<ExitWait>,
    // the semaphore-down syscall that is not answered yet
    sem_wait: Option<&'static Message>,
}

impl Activity {
    pub fn new(
        id: ActId,
        name: &str,
        flags: ActFlags,
        tile: Rc<TileObject>,
        kmem: Rc<KMemObject>,
        eps_start: EpId,
    ) -> Self {
        tile.add_activity();
        Self {
            id,
            name: String::from(name),
            flags,
            tile,
            kmem,
            eps_start,
            state: State::Init,
            exit_code: None,
            wait: None,
            sem_wait: None,
        }
    }

    pub fn id(&self) -> ActId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_root(&self) -> bool {
        self.flags.contains(ActFlags::IS_ROOT)
    }

    pub fn tile(&self) -> &Rc<TileObject> {
        &self.tile
    }

    pub fn tile_id(&self) -> TileId {
        self.tile.tile()
    }

    pub fn kmem(&self) -> &Rc<KMemObject> {
        &self.kmem
    }

    pub fn eps_start(&self) -> EpId {
        self.eps_start
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn set_running(&mut self) {
        self.state = State::Running;
    }

    pub fn exit_code(&self) -> Option<Code> {
        self.exit_code
    }

    /// Marks the activity as dead with the given exit code
    ///
    /// Returns false if the activity was already dead.
    pub fn set_dead(&mut self, code: Code) -> bool {
        if self.state == State::Dead {
            return false;
        }
        self.state = State::Dead;
        self.exit_code = Some(code);
        true
    }

    pub fn wait(&self) -> Option<&ExitWait> {
        self.wait.as_ref()
    }

    /// Installs `wait` and returns the previous one, if any
    pub fn set_wait(&mut self, wait: ExitWait) -> Option<ExitWait> {
        self.wait.replace(wait)
    }

    pub fn take_wait(&mut self) -> Option<ExitWait> {
        self.wait.take()
    }

    pub fn set_sem_wait(&mut self, msg: &'static Message) {
        self.sem_wait = Some(msg);
    }

    pub fn take_sem_wait(&mut self) -> Option<&'static Message> {
        self.sem_wait.take()
    }
}

impl Drop for Activity {
    fn drop(&mut self) {
        self.tile.rem_activity();
    }
}

impl fmt::Debug for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Activity[id={}, name={}, tile={}, eps={}, state={:?}, flags={:?}]",
            self.id,
            self.name,
            self.tile_id(),
            self.eps_start,
            self.state,
            self.flags
        )
    }
}
