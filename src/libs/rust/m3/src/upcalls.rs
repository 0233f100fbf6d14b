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

//! Handles the upcalls from the kernel
//!
//! Upcalls are messages the kernel sends on its own accord to the upcall receive gate of an
//! activity. Currently, they are only used to finish asynchronous waits for activity exits, which
//! are started via [`RunningActivity::wait_async`](crate::tiles::RunningActivity::wait_async).

use crate::cap::Selector;
use crate::errors::{Code, Error};
use crate::io::LogFlags;
use crate::kif::upcalls;
use crate::log;
use crate::serialize::M3Deserializer;
use crate::tcu::Message;
use crate::tiles::Activity;

fn handle(msg: &'static Message) -> Result<(), Error> {
    let mut de = M3Deserializer::new(msg.as_words());
    let res = de.pop::<upcalls::ActivityWait>();
    // upcalls carry no reply capability
    Activity::own().upcall_rgate().ack_msg(msg)?;

    let upcall = res?;
    log!(
        LogFlags::Debug,
        "Received upcall {:?} (event={}, act={}, exitcode={:?})",
        upcall.def.opcode,
        upcall.def.event,
        upcall.act_sel,
        upcall.exitcode
    );

    match upcall.def.opcode {
        upcalls::Operation::ActWait => {
            Activity::own()
                .upcall_results()
                .insert(upcall.def.event, (upcall.act_sel, upcall.exitcode));
        },
    }
    Ok(())
}

/// Handles all upcalls that have arrived so far
pub fn check() -> Result<(), Error> {
    while let Some(msg) = Activity::own().upcall_rgate().fetch() {
        handle(msg)?;
    }
    Ok(())
}

/// Waits for the upcall with given event and returns the selector of the activity that exited
/// and its exit code
pub fn wait(event: u64) -> Result<(Selector, Code), Error> {
    let rgate = Activity::own().upcall_rgate();
    loop {
        if let Some(res) = Activity::own().upcall_results().remove(&event) {
            return Ok(res);
        }

        let msg = rgate.receive(None)?;
        handle(msg)?;
    }
}
