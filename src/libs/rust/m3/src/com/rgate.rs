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
use crate::cell::{Cell, RefCell};
use crate::com::{gate::Gate, GateIStream, SendGate, EP};
use crate::errors::{Code, Error};
use crate::io::LogFlags;
use crate::kif::INVALID_SEL;
use crate::log;
use crate::mem::{GlobOff, MsgBuf};
use crate::rc::{Rc, Weak};
use crate::syscalls;
use crate::tcu::{self, EpId, TCU};
use crate::tiles::{self, Activity, OwnActivity};
use crate::workloop::{ItemId, WorkLoop};

const DEF_MSG_ORD: u32 = 6;

/// The arguments for [`RecvGate`] creations
pub struct RGateArgs {
    order: u32,
    msg_order: u32,
    sel: Selector,
    flags: CapFlags,
}

impl Default for RGateArgs {
    fn default() -> Self {
        RGateArgs {
            order: DEF_MSG_ORD,
            msg_order: DEF_MSG_ORD,
            sel: INVALID_SEL,
            flags: CapFlags::empty(),
        }
    }
}

impl RGateArgs {
    /// Sets the size of the receive buffer as a power of two. That is, the size in bytes is
    /// `2^order`. This overwrites the default size of 64 bytes.
    pub fn order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    /// Sets the size of message slots in the receive buffer as a power of two. That is, the size in
    /// bytes is `2^order`. This overwrites the default size of 64 bytes.
    pub fn msg_order(mut self, msg_order: u32) -> Self {
        self.msg_order = msg_order;
        self
    }

    /// Sets the capability selector to use for the `RecvGate`. Otherwise and by default, a new
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

/// A receive gate receives messages via TCU
///
/// A [`RecvGate`] works in combination with [`SendGate`]s to form message passing channels. A
/// [`SendGate`] is always connected to exactly one [`RecvGate`], whereas a [`RecvGate`] can
/// receive messages from multiple [`SendGate`]s. The header of each message contains the *label*
/// of the [`SendGate`], which allows to distinguish between senders.
///
/// # Receive buffer and credits
///
/// Messages are stored in the receive buffer of the gate, which is split into `2^(order -
/// msg_order)` slots. Senders need a credit for every message, which they get back with the reply
/// to the message. Received messages are *fetched* via [`RecvGate::fetch`] or
/// [`RecvGate::receive`] and need to be either replied to via [`RecvGate::reply`] or acknowledged
/// via [`RecvGate::ack_msg`] afterwards to free the slot again.
///
/// # Activation
///
/// The gate is activated on creation (except for [`RecvGate::new_inactive`]), which allocates a
/// receive buffer and an endpoint with one reply endpoint per slot. [`RecvGate::deactivate`] gives both back; the gate is activated again
/// on the next use.
pub struct RecvGate {
    gate: Gate,
    buf: Cell<Option<usize>>,
    order: u32,
    msg_order: u32,
    item: RefCell<Option<(Weak<WorkLoop>, ItemId)>>,
}

impl RecvGate {
    pub(crate) fn new_def(ep: EpId, addr: usize, order: u32, msg_order: u32) -> Self {
        RecvGate {
            gate: Gate::new_with_ep(INVALID_SEL, CapFlags::KEEP_CAP, EP::new_def_bind(ep)),
            buf: Cell::new(Some(addr)),
            order,
            msg_order,
            item: RefCell::new(None),
        }
    }

    /// Creates a new `RecvGate` with a `2^order` bytes receive buffer and `2^msg_order` bytes
    /// message slots.
    pub fn new(order: u32, msg_order: u32) -> Result<Self, Error> {
        Self::new_with(RGateArgs::default().order(order).msg_order(msg_order))
    }

    /// Creates a new `RecvGate` with given arguments.
    pub fn new_with(args: RGateArgs) -> Result<Self, Error> {
        let rgate = Self::new_inactive(args)?;
        rgate.activate()?;
        Ok(rgate)
    }

    /// Creates a new `RecvGate` with given arguments, but leaves the activation to the first use
    ///
    /// A receive gate can only be activated once. Gates that are meant for another activity,
    /// which binds and activates them, are therefore created this way.
    pub fn new_inactive(args: RGateArgs) -> Result<Self, Error> {
        let slots = args
            .order
            .checked_sub(args.msg_order)
            .and_then(|diff| 1usize.checked_shl(diff));
        match slots {
            Some(n) if n <= crate::cfg::MAX_RB_SLOTS => {},
            _ => return Err(Error::new(Code::InvArgs)),
        }

        let sel = if args.sel == INVALID_SEL {
            Activity::own().alloc_sel()
        }
        else {
            args.sel
        };

        syscalls::create_rgate(sel, args.order, args.msg_order)?;
        Ok(RecvGate {
            gate: Gate::new(sel, args.flags),
            buf: Cell::new(None),
            order: args.order,
            msg_order: args.msg_order,
            item: RefCell::new(None),
        })
    }

    /// Binds a new `RecvGate` to the given selector, which refers to a receive gate with a
    /// `2^order` bytes receive buffer and `2^msg_order` bytes slots.
    pub fn new_bind(sel: Selector, order: u32, msg_order: u32) -> Result<Self, Error> {
        let rgate = RecvGate {
            gate: Gate::new(sel, CapFlags::KEEP_CAP),
            buf: Cell::new(None),
            order,
            msg_order,
            item: RefCell::new(None),
        };
        rgate.activate()?;
        Ok(rgate)
    }

    /// Returns the capability selector
    pub fn sel(&self) -> Selector {
        self.gate.sel()
    }

    /// Returns the endpoint of the gate, if activated
    pub fn ep(&self) -> Option<EpId> {
        self.gate.ep_id()
    }

    /// Returns the size of the receive buffer in bytes
    pub fn size(&self) -> usize {
        1 << self.order
    }

    /// Returns the maximum message size
    pub fn max_msg_size(&self) -> usize {
        1 << self.msg_order
    }

    /// Returns the number of slots in the receive buffer
    pub fn slots(&self) -> usize {
        1 << (self.order - self.msg_order)
    }

    /// Returns the address of the receive buffer, if activated
    pub fn address(&self) -> Option<usize> {
        self.buf.get()
    }

    fn is_std(&self) -> bool {
        self.sel() == INVALID_SEL
    }

    /// Activates this receive gate, if not already done, and returns the endpoint
    pub fn activate(&self) -> Result<EpId, Error> {
        if let Some(ep) = self.gate.ep_id() {
            return Ok(ep);
        }

        let own = Activity::own();
        let addr = own.rbufs_mut().alloc(self.size())?;

        let ep = match own.epmng_mut().acquire(self.slots() as u32) {
            Ok(ep) => ep,
            Err(e) => {
                own.rbufs_mut().free(addr, self.size());
                return Err(e);
            },
        };

        log!(
            LogFlags::LibGates,
            "Activating receive gate {} on {:?} with buffer {:#x}",
            self.sel(),
            ep,
            addr
        );
        if let Err(e) = ep.configure_with(self.sel(), addr as GlobOff) {
            own.epmng_mut().release(ep, false);
            own.rbufs_mut().free(addr, self.size());
            return Err(e);
        }

        let id = ep.id();
        self.buf.set(Some(addr));
        self.gate.set_ep(ep);
        Ok(id)
    }

    /// Deactivates this receive gate, giving back its endpoint and receive buffer
    ///
    /// All unread messages are lost. Work items of this gate ignore it until it is activated
    /// again.
    pub fn deactivate(&self) {
        if self.is_std() {
            return;
        }

        let own = Activity::own();
        if let Some(ep) = self.gate.take_ep() {
            own.epmng_mut().release(ep, true);
        }
        if let Some(addr) = self.buf.take() {
            own.rbufs_mut().free(addr, self.size());
        }
    }

    /// Returns true if there are messages that can be fetched
    pub fn has_msgs(&self) -> bool {
        self.ep().map(TCU::has_msgs).unwrap_or(false)
    }

    /// Tries to fetch a message from the receive gate. If there is an unread message, it returns
    /// a reference to the message.
    pub fn fetch(&self) -> Option<&'static tcu::Message> {
        let ep = self.ep()?;
        let addr = self.address()?;
        TCU::fetch_msg(ep).map(|off| TCU::offset_to_msg(addr, off))
    }

    fn ep_and_addr(&self) -> Result<(EpId, usize), Error> {
        match (self.ep(), self.address()) {
            (Some(ep), Some(addr)) => Ok((ep, addr)),
            _ => Err(Error::new(Code::InvEP)),
        }
    }

    /// Sends `reply` as a reply to the message `msg`.
    pub fn reply(&self, reply: &MsgBuf, msg: &'static tcu::Message) -> Result<(), Error> {
        let (ep, addr) = self.ep_and_addr()?;
        TCU::reply(ep, reply, TCU::msg_to_offset(addr, msg))
    }

    /// Marks the given message as 'read', allowing the TCU to overwrite it with a new message.
    pub fn ack_msg(&self, msg: &tcu::Message) -> Result<(), Error> {
        let (ep, addr) = self.ep_and_addr()?;
        TCU::ack_msg(ep, TCU::msg_to_offset(addr, msg))
    }

    /// Waits until a message arrives and returns a reference to the message.
    ///
    /// If not `None`, the argument `sgate` denotes the [`SendGate`] that was used to send the
    /// request for which this method should receive the reply now. If `sgate` gets disconnected
    /// (e.g., because it was revoked), the method stops waiting and returns
    /// [`RecvGone`](Code::RecvGone).
    pub fn receive(&self, sgate: Option<&SendGate>) -> Result<&'static tcu::Message, Error> {
        let ep = self.activate()?;
        let addr = self.address().ok_or_else(|| Error::new(Code::InvEP))?;
        loop {
            TCU::fetch_events();

            if let Some(off) = TCU::fetch_msg(ep) {
                return Ok(TCU::offset_to_msg(addr, off));
            }

            if let Some(sg) = sgate {
                if !sg.is_connected() {
                    return Err(Error::new(Code::RecvGone));
                }
            }

            OwnActivity::wait_for(Some(ep), None, None)?;
        }
    }

    /// Drops all messages with given label. That is, these messages will be marked as read.
    ///
    /// The send EP of the sender has to be invalidated before to ensure that no further message
    /// of the sender can arrive.
    pub fn drop_msgs_with(&self, label: tcu::Label) {
        if let Ok((ep, addr)) = self.ep_and_addr() {
            TCU::drop_msgs_with(addr, ep, label);
        }
    }

    /// Adds a work item to `wl` that calls `handler` for every message received over this gate
    ///
    /// Messages the handler did not reply to are acknowledged afterwards. If the handler fails,
    /// the error code is sent back as reply.
    pub fn start<F>(self: &Rc<Self>, wl: &Rc<WorkLoop>, handler: F) -> Result<(), Error>
    where
        F: Fn(&mut GateIStream<'_>) -> Result<(), Error> + 'static,
    {
        self.activate()?;
        self.stop();

        let rgate = Rc::downgrade(self);
        let id = wl.add(Rc::new(move || match rgate.upgrade() {
            Some(rg) => rg.handle_msg(&handler),
            None => Ok(false),
        }));
        self.item.replace(Some((Rc::downgrade(wl), id)));
        Ok(())
    }

    /// Removes the work item of this gate from its workloop
    pub fn stop(&self) {
        if let Some((wl, id)) = self.item.take() {
            if let Some(wl) = wl.upgrade() {
                wl.remove(id);
            }
        }
    }

    fn handle_msg<F>(&self, handler: &F) -> Result<bool, Error>
    where
        F: Fn(&mut GateIStream<'_>) -> Result<(), Error>,
    {
        // a deactivated gate is not touched until it is activated again
        let msg = match self.fetch() {
            Some(msg) => msg,
            None => return Ok(false),
        };

        let mut is = GateIStream::new(msg, self);
        if let Err(e) = handler(&mut is) {
            log!(
                LogFlags::LibServReqs,
                "Request on {:?} failed: {:?}",
                self,
                e.code()
            );
            if is.is_pending() {
                is.reply_error(e.code()).ok();
            }
        }
        Ok(true)
    }
}

impl Drop for RecvGate {
    fn drop(&mut self) {
        self.stop();
        if !tiles::is_leaving() && Activity::try_own().is_some() {
            self.deactivate();
        }
    }
}

impl fmt::Debug for RecvGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RecvGate[sel: {}, buf: {:?}, size: {:#x}, ep: {:?}]",
            self.sel(),
            self.buf.get(),
            self.size(),
            self.ep()
        )
    }
}
