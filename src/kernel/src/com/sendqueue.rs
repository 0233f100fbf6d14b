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

use base::col::{Vec, VecDeque};
use base::errors::{Code, Error};
use base::io::LogFlags;
use base::log;
use base::mem::MsgBuf;
use base::rc::Rc;
use base::tcu::Label;

use crate::cap::RGateObject;
use crate::ktcu;

struct Entry {
    id: Label,
    msg: MsgBuf,
}

/// The queue of messages from the kernel to a service
///
/// Only one message is in flight at a time; the next one is sent as soon as the service replied
/// to the previous one. The replies arrive at [`KSRV_EP`](ktcu::KSRV_EP), labeled with the id of
/// the request.
pub struct SendQueue {
    rgate: Rc<RGateObject>,
    inflight: Option<Label>,
    queue: VecDeque<Entry>,
}

impl SendQueue {
    pub fn new(rgate: Rc<RGateObject>) -> Self {
        Self {
            rgate,
            inflight: None,
            queue: VecDeque::new(),
        }
    }

    pub fn inflight(&self) -> Option<Label> {
        self.inflight
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Sends `msg` with the request id `id` or enqueues it if another message is in flight
    pub fn send(&mut self, id: Label, msg: MsgBuf) -> Result<(), Error> {
        if self.inflight.is_some() {
            log!(LogFlags::KernSQueue, "SendQueue: enqueuing request {}", id);
            self.queue.push_back(Entry { id, msg });
            return Ok(());
        }
        self.do_send(id, &msg)
    }

    /// Notifies the queue about the reply to the message in flight
    ///
    /// Sends the next message, if any. The requests that could not be sent are returned with the
    /// error that occurred.
    pub fn received_reply(&mut self) -> Vec<(Label, Error)> {
        log!(LogFlags::KernSQueue, "SendQueue: received reply for {:?}", self.inflight);
        self.inflight = None;

        let mut failed = Vec::new();
        while let Some(e) = self.queue.pop_front() {
            match self.do_send(e.id, &e.msg) {
                Ok(_) => break,
                Err(err) => failed.push((e.id, err)),
            }
        }
        failed
    }

    /// Drops all messages and returns the ids of the requests that will not get a reply
    pub fn abort(&mut self) -> Vec<Label> {
        let mut ids: Vec<Label> = self.inflight.take().into_iter().collect();
        ids.extend(self.queue.drain(..).map(|e| e.id));
        log!(LogFlags::KernSQueue, "SendQueue: aborted requests {:?}", ids);
        ids
    }

    fn do_send(&mut self, id: Label, msg: &MsgBuf) -> Result<(), Error> {
        let (tile, ep) = self.rgate.location().ok_or_else(|| Error::new(Code::RecvGone))?;
        log!(LogFlags::KernSQueue, "SendQueue: sending request {} to {}:EP{}", id, tile, ep);
        ktcu::send_to(tile, ep, 0, msg, id, ktcu::KSRV_EP)?;
        self.inflight = Some(id);
        Ok(())
    }
}
