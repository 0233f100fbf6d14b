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

//! The Trusted Communication Unit interface
//!
//! The TCU is controlled via memory-mapped registers. Unprivileged commands are started by writing
//! the COMMAND register, after the data registers have been set up. The TCU executes one command
//! at a time and signals completion by setting the opcode in COMMAND back to IDLE, together with an
//! error code.

mod ep;
mod msg;
mod regs;

pub use self::ep::{EpType, MemEp, RecvEp, SendEp, SendFlags};
pub use self::msg::{Header, HeaderFlags, Message};
pub use self::regs::*;

use cfg_if::cfg_if;

use core::cmp;
use core::fmt;
use core::sync::atomic;

use crate::arch::tcu as io;
use crate::cfg;
use crate::errors::{Code, Error};
use crate::kif::Perm;
use crate::mem::{self, GlobOff};
use crate::serialize::{Deserialize, Serialize};
use crate::time::TimeDuration;
use crate::tmif;

/// A TCU register
pub type Reg = u64;
/// An endpoint id
pub type EpId = u16;
/// A TCU label used in send EPs
pub type Label = u32;
/// A activity id
pub type ActId = u16;

/// A tile id, consisting of a chip and chip-local tile id
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId {
    id: u16,
}

impl TileId {
    /// Constructs a new tile id out of the given chip and chip-local tile id
    pub const fn new(chip: u8, tile: u8) -> Self {
        Self {
            id: (chip as u16) << 8 | tile as u16,
        }
    }

    /// Constructs a new tile id from the given raw id (e.g., as stored in TCUs)
    pub const fn new_from_raw(raw: u16) -> Self {
        Self { id: raw }
    }

    /// Returns the chip id
    pub const fn chip(&self) -> u8 {
        (self.id >> 8) as u8
    }

    /// Returns the chip-local tile id
    pub const fn tile(&self) -> u8 {
        (self.id & 0xFF) as u8
    }

    /// Returns the raw representation of the id (e.g., as stored in TCUs)
    pub const fn raw(&self) -> u16 {
        self.id
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "C{}T{:02}", self.chip(), self.tile())
    }
}

/// The total number of endpoints in each TCU
pub const TOTAL_EPS: EpId = 128;
/// The number of available endpoints in each TCU
pub const AVAIL_EPS: EpId = TOTAL_EPS;

/// The send EP offset for system calls
pub const SYSC_SEP_OFF: EpId = 0;
/// The receive EP offset for system calls
pub const SYSC_REP_OFF: EpId = 1;
/// The receive EP offset for upcalls from the kernel
pub const UPCALL_REP_OFF: EpId = 2;
/// The reply EP offset for upcalls from the kernel
pub const UPCALL_RPLEP_OFF: EpId = 3;
/// The default receive EP offset
pub const DEF_REP_OFF: EpId = 4;
/// The pager send EP offset
pub const PG_SEP_OFF: EpId = 5;
/// The pager receive EP offset
pub const PG_REP_OFF: EpId = 6;

/// The number of standard EPs
pub const STD_EPS_COUNT: usize = 7;
/// The offset of the first user EP
pub const FIRST_USER_EP: EpId = STD_EPS_COUNT as EpId;

/// An invalid endpoint ID
pub const INVALID_EP: EpId = 0xFFFF;
/// The reply EP for messages that want to disable replies
pub const NO_REPLIES: EpId = INVALID_EP;
/// Represents unlimited credits for send EPs
pub const UNLIM_CREDITS: u32 = 0x3F;
/// The number of registers per EP
pub const EP_REGS: usize = 3;

/// The TCU interface
pub struct TCU {}

impl TCU {
    /// Sends the given message via given endpoint.
    ///
    /// The `reply_ep` specifies the endpoint the reply is sent to. The label of the reply will be
    /// `reply_lbl`.
    ///
    /// # Errors
    ///
    /// If the number of left credits is not sufficient, the function returns
    /// [`MissCredits`](Code::MissCredits).
    #[inline(always)]
    pub fn send(
        ep: EpId,
        msg: &mem::MsgBuf,
        reply_lbl: Label,
        reply_ep: EpId,
    ) -> Result<(), Error> {
        Self::send_aligned(ep, msg.bytes().as_ptr(), msg.size(), reply_lbl, reply_ep)
    }

    /// Sends the message `msg` of `len` bytes via given endpoint. The message address needs to be
    /// 16-byte aligned and `msg`..`msg` + `len` cannot contain a page boundary.
    pub fn send_aligned(
        ep: EpId,
        msg: *const u8,
        len: usize,
        reply_lbl: Label,
        reply_ep: EpId,
    ) -> Result<(), Error> {
        Self::write_data(msg as usize, len);
        Self::write_unpriv_reg(UnprivReg::Arg1, reply_lbl as Reg);
        Self::perform_send_reply(msg as usize, build_cmd(ep, CmdOpCode::Send, reply_ep as Reg))
    }

    /// Sends the given message as reply to the message at offset `msg_off` in the receive buffer
    /// of `ep`.
    #[inline(always)]
    pub fn reply(ep: EpId, reply: &mem::MsgBuf, msg_off: usize) -> Result<(), Error> {
        Self::reply_aligned(ep, reply.bytes().as_ptr(), reply.size(), msg_off)
    }

    /// Sends the given message as reply to the message at offset `msg_off`. The message address
    /// needs to be 16-byte aligned and `reply`..`reply` + `len` cannot contain a page boundary.
    pub fn reply_aligned(
        ep: EpId,
        reply: *const u8,
        len: usize,
        msg_off: usize,
    ) -> Result<(), Error> {
        Self::write_data(reply as usize, len);
        Self::perform_send_reply(
            reply as usize,
            build_cmd(ep, CmdOpCode::Reply, msg_off as Reg),
        )
    }

    fn perform_send_reply(msg_addr: usize, cmd: Reg) -> Result<(), Error> {
        loop {
            match Self::exec(cmd) {
                Err(e) if e.code() == Code::Pagefault => {
                    Self::handle_xlate_fault(msg_addr, Perm::R);
                    // retry the access
                    continue;
                },
                res => break res,
            }
        }
    }

    /// Reads `size` bytes from offset `off` in the memory region denoted by the endpoint into `data`.
    pub fn read(ep: EpId, data: *mut u8, size: usize, off: GlobOff) -> Result<(), Error> {
        let res = Self::perform_transfer(ep, data as usize, size, off, CmdOpCode::Read);
        // ensure that the CPU is not reading the read data before the TCU is finished
        atomic::fence(atomic::Ordering::SeqCst);
        res
    }

    /// Writes `size` bytes from `data` to offset `off` in the memory region denoted by the endpoint.
    pub fn write(ep: EpId, data: *const u8, size: usize, off: GlobOff) -> Result<(), Error> {
        // ensure that the TCU is not reading the data before the CPU has written everything
        atomic::fence(atomic::Ordering::SeqCst);
        Self::perform_transfer(ep, data as usize, size, off, CmdOpCode::Write)
    }

    fn perform_transfer(
        ep: EpId,
        mut data: usize,
        mut size: usize,
        mut off: GlobOff,
        cmd: CmdOpCode,
    ) -> Result<(), Error> {
        while size > 0 {
            let amount = cmp::min(size, cfg::MAX_PKT_SIZE - (data & cfg::PAGE_MASK));

            Self::write_data(data, amount);
            Self::write_unpriv_reg(UnprivReg::Arg1, off as Reg);

            if let Err(e) = Self::exec(build_cmd(ep, cmd, 0)) {
                if e.code() == Code::Pagefault {
                    let perm = if cmd == CmdOpCode::Read {
                        Perm::W
                    }
                    else {
                        Perm::R
                    };
                    Self::handle_xlate_fault(data, perm);
                    // retry the access
                    continue;
                }
                return Err(e);
            }

            size -= amount;
            data += amount;
            off += amount as GlobOff;
        }
        Ok(())
    }

    #[cold]
    fn handle_xlate_fault(addr: usize, perm: Perm) {
        // report translation fault to TileMux; ignore errors, we won't get back here if TileMux
        // cannot resolve the fault.
        tmif::xlate_fault(addr, perm).ok();
    }

    /// Tries to fetch a new message from the given endpoint.
    ///
    /// Returns the offset of the message within the receive buffer.
    pub fn fetch_msg(ep: EpId) -> Option<usize> {
        Self::exec(build_cmd(ep, CmdOpCode::FetchMsg, 0)).ok()?;
        let msg = Self::read_unpriv_reg(UnprivReg::Arg1);
        if msg != !0 {
            Some(msg as usize)
        }
        else {
            None
        }
    }

    /// Fetches the events that occurred since the last call and clears them
    pub fn fetch_events() -> EventMask {
        if Self::exec(build_cmd(0, CmdOpCode::FetchEvents, 0)).is_err() {
            return EventMask::empty();
        }
        EventMask::from_bits_truncate(Self::read_unpriv_reg(UnprivReg::Arg1))
    }

    /// Records the given events, which wakes up the CU if it is sleeping
    pub fn set_event(events: EventMask) -> Result<(), Error> {
        Self::exec(build_cmd(0, CmdOpCode::SetEvent, events.bits()))
    }

    /// Marks the given message for receive endpoint `ep` as read
    pub fn ack_msg(ep: EpId, msg_off: usize) -> Result<(), Error> {
        // ensure that we are really done with the message before acking it
        atomic::fence(atomic::Ordering::SeqCst);
        Self::exec(build_cmd(ep, CmdOpCode::AckMsg, msg_off as Reg))
    }

    /// Puts the CU to sleep until the CU is woken up (e.g., by a message reception).
    pub fn sleep() -> Result<(), Error> {
        Self::wait_for_msg(INVALID_EP, None)
    }

    /// Puts the CU to sleep until a message arrives at receive EP `ep`, an event occurs, or the
    /// timeout (if any) expires.
    pub fn wait_for_msg(ep: EpId, timeout: Option<TimeDuration>) -> Result<(), Error> {
        let nanos = match timeout {
            Some(t) => t.as_nanos() as Reg,
            None => Reg::MAX,
        };
        Self::write_unpriv_reg(UnprivReg::Arg1, nanos);
        Self::exec(build_cmd(0, CmdOpCode::Sleep, ep as Reg))
    }

    /// Assuming that `ep` is a receive EP, the function returns whether there are unread messages.
    pub fn has_msgs(ep: EpId) -> bool {
        Self::unread_count(ep) != 0
    }

    /// Returns the number of unread messages in receive EP `ep`
    pub fn unread_count(ep: EpId) -> u32 {
        RecvEp::from_regs(&Self::read_ep_regs(ep))
            .map(|r| r.unread_count())
            .unwrap_or(0)
    }

    /// Returns true if the given endpoint is valid, i.e., a SEND, RECEIVE, or MEMORY endpoint
    pub fn is_valid(ep: EpId) -> bool {
        EpType::of(&Self::read_ep_regs(ep)) != EpType::Invalid
    }

    /// Returns the number of credits for the given endpoint
    pub fn credits(ep: EpId) -> Result<u32, Error> {
        SendEp::from_regs(&Self::read_ep_regs(ep))
            .map(|s| s.cur_crd)
            .ok_or_else(|| Error::new(Code::NoSEP))
    }

    /// Returns true if the given endpoint is a SEND EP with at least one credit
    pub fn has_credits(ep: EpId) -> bool {
        Self::credits(ep).map(|c| c > 0).unwrap_or(false)
    }

    /// Returns true if the given endpoint is a SEND EP and has missing credits
    pub fn has_missing_credits(ep: EpId) -> bool {
        match SendEp::from_regs(&Self::read_ep_regs(ep)) {
            Some(s) => s.cur_crd < s.max_crd,
            None => false,
        }
    }

    /// Unpacks the given memory EP, returning `None` if it is no memory EP
    pub fn unpack_mem_ep(ep: EpId) -> Option<MemEp> {
        MemEp::from_regs(&Self::read_ep_regs(ep))
    }

    /// Drops all messages in the receive buffer of given receive EP that have the given label.
    pub fn drop_msgs_with(buf_addr: usize, ep: EpId, label: Label) {
        let rep = match RecvEp::from_regs(&Self::read_ep_regs(ep)) {
            Some(rep) => rep,
            None => return,
        };
        // we assume that the one that used the label can no longer send messages. thus, if there
        // are no messages yet, we are done.
        if rep.unread == 0 {
            return;
        }

        for slot in 0..rep.slots() {
            if (rep.unread & (1 << slot)) != 0 {
                let off = rep.slot_offset(slot);
                let msg = Self::offset_to_msg(buf_addr, off);
                if msg.header.label() == label {
                    Self::ack_msg(ep, off).ok();
                }
            }
        }
    }

    /// Prints the given message into the log of the platform
    pub fn print(s: &[u8]) -> usize {
        cfg_if! {
            if #[cfg(feature = "loopback")] {
                io::print(s)
            }
            else {
                let s = &s[0..cmp::min(s.len(), cfg::PAGE_SIZE)];
                Self::write_data(s.as_ptr() as usize, s.len());
                match Self::exec(build_cmd(0, CmdOpCode::Print, 0)) {
                    Ok(_) => s.len(),
                    Err(_) => 0,
                }
            }
        }
    }

    /// Returns the time in nanoseconds since boot
    pub fn nanotime() -> u64 {
        Self::read_unpriv_reg(UnprivReg::CurTime)
    }

    /// Invalidates the given endpoint, unless it has missing credits
    ///
    /// With `force`, the endpoint is invalidated in any case.
    pub fn invalidate_ep(ep: EpId, force: bool) -> Result<(), Error> {
        Self::write_reg(
            RegKey::Ext(ExtReg::ExtCmd),
            build_ext_cmd(ep, ExtCmdOpCode::InvEP, force),
        );
        let res = Self::read_reg(RegKey::Ext(ExtReg::ExtCmd));
        Result::from(Code::from(((res >> 4) & 0x1F) as u32))
    }

    /// Translates the offset `off` to the message address, using `base` as the base address of the
    /// message's receive buffer
    pub fn offset_to_msg(base: usize, off: usize) -> &'static Message {
        // safety: the TCU wrote a valid message at this place, which stays valid until it is
        // acknowledged
        unsafe { Message::from_addr(io::local_addr(base + off)) }
    }

    /// Translates the message address `msg` to the offset within its receive buffer, using `base`
    /// as the base address of the receive buffer
    pub fn msg_to_offset(base: usize, msg: &Message) -> usize {
        msg.addr() - io::local_addr(base)
    }

    /// Builds the registers for a receive endpoint
    pub fn config_recv(
        act: ActId,
        buf: GlobOff,
        buf_ord: u32,
        msg_ord: u32,
        reply_eps: Option<EpId>,
    ) -> [Reg; EP_REGS] {
        RecvEp {
            act,
            reply_eps,
            slots_order: buf_ord - msg_ord,
            msg_order: msg_ord,
            rpos: 0,
            wpos: 0,
            buffer: buf,
            occupied: 0,
            unread: 0,
        }
        .to_regs()
    }

    /// Builds the registers for a send endpoint
    #[allow(clippy::too_many_arguments)]
    pub fn config_send(
        act: ActId,
        lbl: Label,
        tile: TileId,
        dst_ep: EpId,
        msg_order: u32,
        credits: u32,
    ) -> [Reg; EP_REGS] {
        SendEp {
            act,
            cur_crd: credits,
            max_crd: credits,
            msg_order,
            flags: SendFlags::empty(),
            crd_ep: INVALID_EP,
            tile,
            dst_ep,
            label: lbl,
        }
        .to_regs()
    }

    /// Builds the registers for a memory endpoint
    pub fn config_mem(
        act: ActId,
        tile: TileId,
        addr: GlobOff,
        size: GlobOff,
        perm: Perm,
    ) -> [Reg; EP_REGS] {
        MemEp {
            act,
            perm,
            tile,
            addr,
            size,
        }
        .to_regs()
    }

    /// Returns the registers of the given endpoint
    pub fn read_ep_regs(ep: EpId) -> [Reg; EP_REGS] {
        [
            Self::read_reg(RegKey::Ep(ep, EpReg::R0)),
            Self::read_reg(RegKey::Ep(ep, EpReg::R1)),
            Self::read_reg(RegKey::Ep(ep, EpReg::R2)),
        ]
    }

    /// Configures the given endpoint
    pub fn set_ep_regs(ep: EpId, regs: &[Reg; EP_REGS]) {
        Self::write_reg(RegKey::Ep(ep, EpReg::R0), regs[0]);
        Self::write_reg(RegKey::Ep(ep, EpReg::R1), regs[1]);
        Self::write_reg(RegKey::Ep(ep, EpReg::R2), regs[2]);
    }

    /// Returns the number of commands that have been issued by the current activity
    #[cfg(feature = "loopback")]
    pub fn command_count() -> u64 {
        io::command_count()
    }

    /// Returns the value of the given unprivileged register
    pub fn read_unpriv_reg(reg: UnprivReg) -> Reg {
        Self::read_reg(RegKey::Unpriv(reg))
    }

    /// Sets the value of the given unprivileged register to `val`
    pub fn write_unpriv_reg(reg: UnprivReg, val: Reg) {
        Self::write_reg(RegKey::Unpriv(reg), val)
    }

    fn write_data(addr: usize, size: usize) {
        Self::write_unpriv_reg(UnprivReg::DataAddr, addr as Reg);
        Self::write_unpriv_reg(UnprivReg::DataSize, size as Reg);
    }

    /// Starts the given command and waits for its completion
    fn exec(cmd: Reg) -> Result<(), Error> {
        // only one command can be in flight
        Self::get_error().ok();
        Self::write_unpriv_reg(UnprivReg::Command, cmd);
        Self::get_error()
    }

    /// Waits until the current command is completed and returns the error, if any occurred
    fn get_error() -> Result<(), Error> {
        loop {
            let (op, _, err, _) = split_cmd(Self::read_unpriv_reg(UnprivReg::Command));
            if op == CmdOpCode::Idle {
                return Result::from(Code::from(err));
            }
        }
    }

    fn read_reg(key: RegKey) -> Reg {
        if matches!(
            key,
            RegKey::Unpriv(UnprivReg::Arg1 | UnprivReg::Events | UnprivReg::CurTime)
        ) {
            atomic::fence(atomic::Ordering::SeqCst);
        }
        io::read_reg(key)
    }

    fn write_reg(key: RegKey, val: Reg) {
        if matches!(
            key,
            RegKey::Unpriv(UnprivReg::Command) | RegKey::Ext(ExtReg::ExtCmd)
        ) {
            atomic::fence(atomic::Ordering::SeqCst);
        }
        io::write_reg(key, val)
    }
}
