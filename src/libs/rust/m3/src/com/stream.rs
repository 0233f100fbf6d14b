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

use core::mem;
use core::ops;

use crate::com::{RecvGate, SendGate};
use crate::errors::{Code, Error};
use crate::mem::MsgBuf;
use crate::serialize::{Deserialize, M3Deserializer};
use crate::tcu;

/// Reads the values of a message that arrived at a [`RecvGate`]
///
/// The stream owns the message slot: dropping it acks the message, unless it was answered with
/// [`GateIStream::reply`] or handed out via [`GateIStream::take_msg`].
#[derive(Debug)]
pub struct GateIStream<'r> {
    msg: &'static tcu::Message,
    source: M3Deserializer<'static>,
    rgate: &'r RecvGate,
    pending: bool,
}

impl<'r> GateIStream<'r> {
    pub fn new(msg: &'static tcu::Message, rgate: &'r RecvGate) -> Self {
        let source = M3Deserializer::new(msg.as_words());
        Self {
            msg,
            source,
            rgate,
            pending: true,
        }
    }

    pub fn rgate(&self) -> &RecvGate {
        self.rgate
    }

    /// The label of the send EP the message came from
    #[inline(always)]
    pub fn label(&self) -> tcu::Label {
        self.msg.header.label()
    }

    /// The payload size in bytes, without the header
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.source.size() * mem::size_of::<u64>()
    }

    pub fn msg(&self) -> &'static tcu::Message {
        self.msg
    }

    /// Whether the message still occupies its slot
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Takes the message out of the stream; the caller is now responsible for the ack
    pub fn take_msg(&mut self) -> &'static tcu::Message {
        self.pending = false;
        self.msg
    }

    /// Reads the next value; fails with [`InvArgs`](Code::InvArgs) if the message is too short
    #[inline(always)]
    pub fn pop<T: Deserialize<'static>>(&mut self) -> Result<T, Error> {
        self.source.pop()
    }

    /// Answers the message with `reply`, which also frees its slot
    #[inline(always)]
    pub fn reply(&mut self, reply: &MsgBuf) -> Result<(), Error> {
        self.rgate.reply(reply, self.msg)?;
        self.pending = false;
        Ok(())
    }

    /// Answers the message with nothing but `err`
    pub fn reply_error(&mut self, err: Code) -> Result<(), Error> {
        crate::reply_vmsg!(self, err)
    }
}

impl<'r> ops::Drop for GateIStream<'r> {
    fn drop(&mut self) {
        if self.pending {
            self.rgate.ack_msg(self.msg).ok();
        }
    }
}

/// Sends `$args` as one message via `$sg`; a reply will arrive at `$rg`
#[macro_export]
macro_rules! send_vmsg {
    ( $sg:expr, $rg:expr, $( $args:expr ),* ) => ({
        let mut msg = $crate::mem::MsgBuf::new();
        $crate::build_vmsg!(msg, $( $args ),*);
        $sg.send(&msg, $rg)
    });
}

/// Replies `$args` to the message of the [`GateIStream`] `$is`
#[macro_export]
macro_rules! reply_vmsg {
    ( $is:expr, $( $args:expr ),* ) => ({
        let mut msg = $crate::mem::MsgBuf::new();
        $crate::build_vmsg!(msg, $( $args ),*);
        $is.reply(&msg)
    });
}

/// Waits for a message at `$rg` and reads it as a tuple of `$t`
///
/// The message is acked before the tuple is returned, so `$t` cannot borrow from it.
#[macro_export]
macro_rules! recv_vmsg {
    ( $rg:expr, $( $t:ty ),+ ) => ({
        $crate::com::recv_msg($rg).and_then(|mut is| {
            Ok(( $( is.pop::<$t>()?, )+ ))
        })
    });
}

/// Sends `$args` via `$sg` and waits for the reply at `$rg`
#[macro_export]
macro_rules! send_recv {
    ( $sg:expr, $rg:expr, $( $args:expr ),* ) => ({
        let mut msg = $crate::mem::MsgBuf::new();
        $crate::build_vmsg!(msg, $( $args ),*);
        $sg.call(&msg, $rg)
            .map(|m| $crate::com::GateIStream::new(m, $rg))
    });
}

/// Like [`send_recv`], but turns a reply that starts with an error code into that error
#[macro_export]
macro_rules! send_recv_res {
    ( $sg:expr, $rg:expr, $( $args:expr ),* ) => ({
        $crate::send_recv!($sg, $rg, $( $args ),* ).and_then($crate::com::check_result)
    });
}

#[inline(always)]
pub fn recv_msg(rgate: &RecvGate) -> Result<GateIStream<'_>, Error> {
    recv_reply(rgate, None)
}

/// Waits for the reply at `rgate` to a message sent via `sgate`
///
/// Fails with [`RecvGone`](Code::RecvGone) if `sgate` is revoked in the meantime.
#[inline(always)]
pub fn recv_reply<'r>(
    rgate: &'r RecvGate,
    sgate: Option<&SendGate>,
) -> Result<GateIStream<'r>, Error> {
    rgate.receive(sgate).map(|m| GateIStream::new(m, rgate))
}

/// Like [`recv_reply`], but also reads the leading error code and returns it as error
#[inline(always)]
pub fn recv_result<'r>(
    rgate: &'r RecvGate,
    sgate: Option<&SendGate>,
) -> Result<GateIStream<'r>, Error> {
    recv_reply(rgate, sgate).and_then(check_result)
}

#[doc(hidden)]
pub fn check_result(mut reply: GateIStream<'_>) -> Result<GateIStream<'_>, Error> {
    match reply.pop::<Code>()? {
        Code::Success => Ok(reply),
        e => Err(Error::new(e)),
    }
}
