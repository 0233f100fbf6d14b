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

use core::fmt;

use crate::cap::{CapFlags, Selector};
use crate::com::gate::Gate;
use crate::com::{RecvGate, EP};
use crate::errors::{Code, Error};
use crate::kif::INVALID_SEL;
use crate::mem::MsgBuf;
use crate::syscalls;
use crate::tcu::{self, EpId, TCU, UNLIM_CREDITS};
use crate::tiles::{Activity, OwnActivity};

/// The arguments for [`SendGate`] creations.
pub struct SGateArgs {
    rgate_sel: Selector,
    label: tcu::Label,
    credits: u32,
    sel: Selector,
    flags: CapFlags,
}

impl SGateArgs {
    /// Creates a new `SGateArgs` to send messages to `rgate` with default settings.
    pub fn new(rgate: &RecvGate) -> Self {
        Self::new_for_sel(rgate.sel())
    }

    /// Creates a new `SGateArgs` to send messages to the receive gate with selector `rgate`.
    pub fn new_for_sel(rgate: Selector) -> Self {
        SGateArgs {
            rgate_sel: rgate,
            label: 0,
            credits: UNLIM_CREDITS,
            sel: INVALID_SEL,
            flags: CapFlags::empty(),
        }
    }

    /// Sets the credits to `credits`, that is, the number of messages that can be in flight.
    pub fn credits(mut self, credits: u32) -> Self {
        self.credits = credits;
        self
    }

    /// Sets the label to `label`.
    pub fn label(mut self, label: tcu::Label) -> Self {
        self.label = label;
        self
    }

    /// Sets the capability selector to use for the [`SendGate`]. Otherwise and by default, a new
    /// selector is allocated.
    pub fn sel(mut self, sel: Selector) -> Self {
        self.sel = sel;
        self
    }

    /// Sets the flags to `flags`.
    pub fn flags(mut self, flags: CapFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// A send gate sends message via TCU
///
/// The gate is activated on first use, that is, bound to an endpoint. Each message consumes a
/// credit, which is given back with the reply. [`SendGate::send`] waits for credits, whereas
/// [`SendGate::try_send`] fails with [`MissCredits`](Code::MissCredits) instead. The interaction of
/// [`SendGate`]s and [`RecvGate`]s is explained [`here`](`RecvGate`).
pub struct SendGate {
    gate: Gate,
}

impl SendGate {
    pub(crate) fn new_def(ep: EpId) -> Self {
        SendGate {
            gate: Gate::new_with_ep(INVALID_SEL, CapFlags::KEEP_CAP, EP::new_def_bind(ep)),
        }
    }

    /// Creates a new `SendGate` that can send messages to `rgate`.
    pub fn new(rgate: &RecvGate) -> Result<Self, Error> {
        Self::new_with(SGateArgs::new(rgate))
    }

    /// Creates a new `SendGate` with given arguments.
    pub fn new_with(args: SGateArgs) -> Result<Self, Error> {
        let sel = if args.sel == INVALID_SEL {
            Activity::own().alloc_sel()
        }
        else {
            args.sel
        };

        syscalls::create_sgate(sel, args.rgate_sel, args.label, args.credits)?;
        Ok(SendGate {
            gate: Gate::new(sel, args.flags),
        })
    }

    /// Binds a new `SendGate` to the given capability selector. The capability is not revoked on
    /// drop.
    pub fn new_bind(sel: Selector) -> Self {
        SendGate {
            gate: Gate::new(sel, CapFlags::KEEP_CAP),
        }
    }

    /// Binds a new `SendGate` to the given capability selector, which is owned by the gate and
    /// thus revoked on drop.
    pub fn new_owned_bind(sel: Selector) -> Self {
        SendGate {
            gate: Gate::new(sel, CapFlags::empty()),
        }
    }

    /// Returns the capability selector.
    pub fn sel(&self) -> Selector {
        self.gate.sel()
    }

    /// Returns the endpoint of the gate, if activated
    pub fn ep(&self) -> Option<EpId> {
        self.gate.ep_id()
    }

    /// Activates the gate, if not already done, and returns the endpoint
    pub fn activate(&self) -> Result<EpId, Error> {
        self.gate.activate()
    }

    /// Returns the number of available credits
    pub fn credits(&self) -> Result<u32, Error> {
        TCU::credits(self.activate()?)
    }

    /// Returns whether the TCU EP has credits to send a message
    pub fn can_send(&self) -> Result<bool, Error> {
        Ok(self.credits()? > 0)
    }

    /// Returns false if the gate has been activated, but the endpoint is no longer valid, because
    /// the gate was revoked
    pub fn is_connected(&self) -> bool {
        self.ep().map(TCU::is_valid).unwrap_or(true)
    }

    /// Sends `msg` to the associated [`RecvGate`] and uses `reply_gate` to receive a reply.
    ///
    /// Waits for credits if necessary.
    pub fn send(&self, msg: &MsgBuf, reply_gate: &RecvGate) -> Result<(), Error> {
        self.send_with_rlabel(msg, reply_gate, 0)
    }

    /// Like [`SendGate::send`], but lets the communication partner use the label `rlabel` for the
    /// reply.
    pub fn send_with_rlabel(
        &self,
        msg: &MsgBuf,
        reply_gate: &RecvGate,
        rlabel: tcu::Label,
    ) -> Result<(), Error> {
        loop {
            TCU::fetch_events();
            match self.try_send_with_rlabel(msg, reply_gate, rlabel) {
                Err(e) if e.code() == Code::MissCredits => {
                    OwnActivity::wait_for(None, None, None)?
                },
                res => break res,
            }
        }
    }

    /// Sends `msg` to the associated [`RecvGate`] and uses `reply_gate` to receive a reply.
    ///
    /// In contrast to [`SendGate::send`], this method fails with
    /// [`MissCredits`](Code::MissCredits) if no credits are left.
    pub fn try_send(&self, msg: &MsgBuf, reply_gate: &RecvGate) -> Result<(), Error> {
        self.try_send_with_rlabel(msg, reply_gate, 0)
    }

    /// Like [`SendGate::try_send`], but lets the communication partner use the label `rlabel` for
    /// the reply.
    pub fn try_send_with_rlabel(
        &self,
        msg: &MsgBuf,
        reply_gate: &RecvGate,
        rlabel: tcu::Label,
    ) -> Result<(), Error> {
        let ep = self.activate()?;
        let rep = reply_gate.activate()?;
        TCU::send(ep, msg, rlabel, rep).map_err(|e| match e.code() {
            Code::NoSEP => Error::new(Code::NotConnected),
            _ => e,
        })
    }

    /// Sends `msg` to the associated [`RecvGate`], waits for the reply on `reply_gate`, and
    /// returns it.
    pub fn call(
        &self,
        msg: &MsgBuf,
        reply_gate: &RecvGate,
    ) -> Result<&'static tcu::Message, Error> {
        self.send(msg, reply_gate)?;
        reply_gate.receive(Some(self))
    }
}

impl fmt::Debug for SendGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SendGate[sel: {}, ep: {:?}]", self.sel(), self.ep())
    }
}
