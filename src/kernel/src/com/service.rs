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

use base::cell::RefCell;
use base::col::{String, ToString};
use base::rc::Rc;
use base::tcu::ActId;

use core::fmt;

use crate::cap::RGateObject;
use crate::com::SendQueue;

/// A service that has been registered at the kernel
pub struct Service {
    id: u64,
    name: String,
    owner: ActId,
    rgate: Rc<RGateObject>,
    queue: RefCell<SendQueue>,
}

impl Service {
    pub fn new(id: u64, name: &str, owner: ActId, rgate: Rc<RGateObject>) -> Rc<Self> {
        Rc::new(Self {
            id,
            name: name.to_string(),
            owner,
            queue: RefCell::new(SendQueue::new(rgate.clone())),
            rgate,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the activity that provides the service
    pub fn owner(&self) -> ActId {
        self.owner
    }

    pub fn rgate(&self) -> &Rc<RGateObject> {
        &self.rgate
    }

    pub fn queue(&self) -> &RefCell<SendQueue> {
        &self.queue
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Service[id={}, name={}, owner={}, rgate={:?}]",
            self.id, self.name, self.owner, self.rgate
        )
    }
}
