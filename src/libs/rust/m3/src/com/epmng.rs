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

use crate::cap::Selector;
use crate::col::Vec;
use crate::com::EP;
use crate::errors::Error;
use crate::io::LogFlags;
use crate::log;

/// The endpoint manager
///
/// Gates are bound to endpoints on first use. Endpoints without reply slots are cached after
/// their gate is gone and reused for the next activation.
#[derive(Default)]
pub struct EpMng {
    eps: Vec<EP>,
}

impl EpMng {
    /// Acquires an endpoint with `replies` reply slots
    pub fn acquire(&mut self, replies: u32) -> Result<EP, Error> {
        if replies == 0 {
            if let Some(ep) = self.eps.pop() {
                return Ok(ep);
            }
        }
        EP::new_with(crate::com::EPArgs::default().replies(replies))
    }

    /// Puts `ep` back into the cache. With `invalidate`, the endpoint is invalidated first.
    ///
    /// Endpoints with reply slots are freed instead.
    pub fn release(&mut self, ep: EP, invalidate: bool) {
        if ep.is_std() {
            return;
        }
        if ep.replies() != 0 {
            return;
        }

        if invalidate {
            if let Err(e) = ep.invalidate() {
                log!(LogFlags::Error, "Unable to invalidate {:?}: {:?}", ep, e);
                return;
            }
        }
        self.eps.push(ep);
    }

    /// Acquires an endpoint and configures it for `gate`
    pub fn activate(&mut self, gate: Selector) -> Result<EP, Error> {
        let ep = self.acquire(0)?;
        log!(LogFlags::LibGates, "Activating gate {} on {:?}", gate, ep);
        if let Err(e) = ep.configure(gate) {
            self.release(ep, false);
            return Err(e);
        }
        Ok(ep)
    }

    /// Returns the number of cached endpoints
    pub fn cached(&self) -> usize {
        self.eps.len()
    }
}
