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

//! The command engine of the emulated TCU
//!
//! All functions are called with the machine lock held and thus execute atomically with respect
//! to all other tiles.

use crate::errors::{Code, Error};
use crate::io::LogFlags;
use crate::kif::Perm;
use crate::log;
use crate::mem::{self, GlobOff};
use crate::tcu::{
    CmdOpCode, EpId, EpType, EventMask, Header, HeaderFlags, Label, MemEp, RecvEp, Reg, RegKey,
    SendEp, SendFlags, TileId, UnprivReg, EP_REGS, INVALID_EP, NO_REPLIES, TOTAL_EPS,
};

use super::machine::{Machine, State};

macro_rules! log_tcu {
    ($($args:tt)*) => {
        log!(LogFlags::TCU, $($args)*)
    };
}

macro_rules! log_tcu_critical {
    ($($args:tt)*) => {
        log!(LogFlags::TCUErr, $($args)*)
    };
}

const HEADER_SIZE: usize = mem::size_of::<Header>();

fn check_ep(ep: EpId) -> Result<(), Error> {
    if ep >= TOTAL_EPS {
        Err(Error::new(Code::InvEP))
    }
    else {
        Ok(())
    }
}

/// Executes the given command (except for SLEEP) on behalf of `tile`
///
/// Returns whether other tiles might be affected by the command.
pub(crate) fn execute(
    m: &Machine,
    st: &mut State,
    tile: TileId,
    op: CmdOpCode,
    ep: EpId,
    arg: Reg,
) -> Result<bool, Error> {
    let ts = st.tile(tile)?;
    let data_addr = ts.reg(RegKey::Unpriv(UnprivReg::DataAddr)) as usize;
    let data_size = ts.reg(RegKey::Unpriv(UnprivReg::DataSize)) as usize;
    let arg1 = ts.reg(RegKey::Unpriv(UnprivReg::Arg1));

    match op {
        CmdOpCode::Idle => Ok(false),
        CmdOpCode::Send => send(m, st, tile, ep, data_addr, data_size, arg1 as Label, arg as EpId)
            .map(|_| true),
        CmdOpCode::Reply => reply(m, st, tile, ep, data_addr, data_size, arg as usize).map(|_| true),
        CmdOpCode::Read | CmdOpCode::Write => {
            transfer(m, st, tile, ep, data_addr, data_size, arg1, op == CmdOpCode::Read)
                .map(|_| false)
        },
        CmdOpCode::FetchMsg => {
            let res = fetch(st, tile, ep)?;
            st.tile_mut(tile)?
                .set_reg(RegKey::Unpriv(UnprivReg::Arg1), res.map(|o| o as Reg).unwrap_or(!0));
            Ok(false)
        },
        CmdOpCode::FetchEvents => {
            let ts = st.tile_mut(tile)?;
            let ev = ts.events;
            ts.events = EventMask::empty();
            ts.set_reg(RegKey::Unpriv(UnprivReg::Arg1), ev.bits());
            Ok(false)
        },
        CmdOpCode::SetEvent => {
            st.tile_mut(tile)?.events |= EventMask::from_bits_truncate(arg);
            Ok(true)
        },
        CmdOpCode::AckMsg => ack(st, tile, ep, arg as usize).map(|_| false),
        // sleep and print are handled by the caller
        CmdOpCode::Sleep | CmdOpCode::Print => Err(Error::new(Code::UnknownCmd)),
    }
}

fn send(
    m: &Machine,
    st: &mut State,
    tile: TileId,
    ep: EpId,
    data: usize,
    size: usize,
    reply_lbl: Label,
    reply_ep: EpId,
) -> Result<(), Error> {
    check_ep(ep)?;
    let mut sep = SendEp::from_regs(&st.tile(tile)?.ep_regs(ep)).ok_or_else(|| {
        log_tcu!("{}:EP{}: send to non-send EP", tile, ep);
        Error::new(Code::NoSEP)
    })?;
    if sep.flags.contains(SendFlags::REPLY) {
        return Err(Error::new(Code::SendReplyEP));
    }
    if size > Header::MAX_LENGTH {
        return Err(Error::new(Code::SendInvMsgSize));
    }
    sep.take_credit(size + HEADER_SIZE)?;

    // determine the size of the reply receive buffer slots
    let reply_size = if reply_ep != NO_REPLIES {
        check_ep(reply_ep)?;
        let rep = RecvEp::from_regs(&st.tile(tile)?.ep_regs(reply_ep))
            .ok_or_else(|| Error::new(Code::NoREP))?;
        rep.msg_order
    }
    else {
        0
    };

    let flags = HeaderFlags::empty();
    let header = Header::new(flags, reply_size, tile, ep, reply_ep, size, reply_lbl, sep.label);
    // safety: the runtime passes a valid message buffer
    let payload = unsafe { core::slice::from_raw_parts(data as *const u8, size) };

    log_tcu!(
        "{}:EP{}: sending {} bytes to {}:EP{} (label={:#x}, reply={})",
        tile,
        ep,
        size,
        sep.tile,
        sep.dst_ep,
        sep.label,
        reply_ep
    );

    let slot = deliver(m, st, sep.tile, sep.dst_ep, &header, payload)?;

    // install the reply EP at the receiver, if requested
    if reply_ep != NO_REPLIES {
        let dst = st.tile_mut(sep.tile)?;
        if let Some(rep) = RecvEp::from_regs(&dst.ep_regs(sep.dst_ep)) {
            if let Some(reply_eps) = rep.reply_eps {
                let reply = SendEp {
                    act: rep.act,
                    cur_crd: 1,
                    max_crd: 1,
                    msg_order: reply_size,
                    flags: SendFlags::REPLY,
                    crd_ep: ep,
                    tile,
                    dst_ep: reply_ep,
                    label: reply_lbl,
                };
                dst.set_ep_regs(reply_eps + slot as EpId, &reply.to_regs());
            }
        }
    }

    st.tile_mut(tile)?.set_ep_regs(ep, &sep.to_regs());
    Ok(())
}

/// Places the given message into a free slot of receive EP `ep` on `tile`
///
/// Returns the slot the message has been placed in.
pub(crate) fn deliver(
    m: &Machine,
    st: &mut State,
    tile: TileId,
    ep: EpId,
    header: &Header,
    payload: &[u8],
) -> Result<usize, Error> {
    check_ep(ep)?;
    let dst = st.tile_mut(tile)?;
    let mut rep = RecvEp::from_regs(&dst.ep_regs(ep)).ok_or_else(|| {
        log_tcu_critical!("{}:EP{}: dropping message, receiver is gone", tile, ep);
        Error::new(Code::RecvGone)
    })?;

    if header.reply_ep() != NO_REPLIES && rep.reply_eps.is_none() {
        return Err(Error::new(Code::RepliesDisabled));
    }

    let total = HEADER_SIZE + payload.len();
    if total > (1 << rep.msg_order) {
        log_tcu_critical!(
            "{}:EP{}: dropping message of {} bytes, slots have {} bytes",
            tile,
            ep,
            total,
            1 << rep.msg_order
        );
        return Err(Error::new(Code::RecvOutOfBounds));
    }

    let slot = rep.find_free_slot().ok_or_else(|| {
        log_tcu_critical!("{}:EP{}: dropping message, no free slot", tile, ep);
        Error::new(Code::RecvNoSpace)
    })?;

    let addr = rep.buffer + rep.slot_offset(slot) as GlobOff;
    let host = m
        .mem(tile)?
        .translate(addr, total)
        .ok_or_else(|| Error::new(Code::RecvOutOfBounds))?;
    // safety: the destination has been checked to be within the tile's memory
    unsafe {
        libc::memcpy(
            host as *mut libc::c_void,
            header as *const Header as *const libc::c_void,
            HEADER_SIZE,
        );
        libc::memcpy(
            (host + HEADER_SIZE) as *mut libc::c_void,
            payload.as_ptr() as *const libc::c_void,
            payload.len(),
        );
    }

    rep.occupy(slot);
    dst.set_ep_regs(ep, &rep.to_regs());
    dst.events |= EventMask::MSG_RECV;

    log_tcu!(
        "{}:EP{}: put message at slot {} (unread={:#x})",
        tile,
        ep,
        slot,
        rep.unread
    );
    Ok(slot)
}

fn reply(
    m: &Machine,
    st: &mut State,
    tile: TileId,
    ep: EpId,
    data: usize,
    size: usize,
    msg_off: usize,
) -> Result<(), Error> {
    check_ep(ep)?;
    let ts = st.tile(tile)?;
    let mut rep = RecvEp::from_regs(&ts.ep_regs(ep)).ok_or_else(|| Error::new(Code::NoREP))?;
    let slot = rep
        .offset_slot(msg_off)
        .ok_or_else(|| Error::new(Code::InvMsgOff))?;
    if rep.occupied & (1 << slot) == 0 {
        return Err(Error::new(Code::InvMsgOff));
    }
    let reply_eps = rep.reply_eps.ok_or_else(|| Error::new(Code::RepliesDisabled))?;
    let reply_ep = reply_eps + slot as EpId;
    let sep = SendEp::from_regs(&ts.ep_regs(reply_ep))
        .filter(|s| s.flags.contains(SendFlags::REPLY))
        .ok_or_else(|| {
            log_tcu!("{}:EP{}: no reply capability for slot {}", tile, ep, slot);
            Error::new(Code::SendReplyEP)
        })?;
    if size + HEADER_SIZE > (1 << sep.msg_order) {
        return Err(Error::new(Code::SendInvMsgSize));
    }

    // the reply acknowledges the message and consumes the reply capability
    rep.ack(msg_off)?;
    let ts = st.tile_mut(tile)?;
    ts.set_ep_regs(ep, &rep.to_regs());
    ts.set_ep_regs(reply_ep, &[0; EP_REGS]);

    let header = Header::new(
        HeaderFlags::REPLY,
        0,
        tile,
        ep,
        NO_REPLIES,
        size,
        0,
        sep.label,
    );
    // safety: the runtime passes a valid message buffer
    let payload = unsafe { core::slice::from_raw_parts(data as *const u8, size) };

    log_tcu!(
        "{}:EP{}: replying {} bytes to {}:EP{} (label={:#x})",
        tile,
        ep,
        size,
        sep.tile,
        sep.dst_ep,
        sep.label
    );

    deliver(m, st, sep.tile, sep.dst_ep, &header, payload)?;
    refill(st, sep.tile, sep.crd_ep);
    Ok(())
}

/// Gives a credit back to send EP `ep` on `tile`
///
/// The credit is dropped if the EP is no longer a send EP or has all of its credits.
fn refill(st: &mut State, tile: TileId, ep: EpId) {
    if check_ep(ep).is_err() {
        return;
    }
    let ts = match st.tile_mut(tile) {
        Ok(ts) => ts,
        Err(_) => return,
    };
    match SendEp::from_regs(&ts.ep_regs(ep)) {
        Some(mut sep) => {
            if sep.refill() {
                ts.set_ep_regs(ep, &sep.to_regs());
                ts.events |= EventMask::CRD_RECV;
                log_tcu!("{}:EP{}: received credit (now {})", tile, ep, sep.cur_crd);
            }
            else {
                log_tcu!("{}:EP{}: dropping credit", tile, ep);
            }
        },
        None => log_tcu!("{}:EP{}: dropping credit", tile, ep),
    }
}

#[allow(clippy::too_many_arguments)]
fn transfer(
    m: &Machine,
    st: &mut State,
    tile: TileId,
    ep: EpId,
    data: usize,
    size: usize,
    off: GlobOff,
    read: bool,
) -> Result<(), Error> {
    check_ep(ep)?;
    let mep = MemEp::from_regs(&st.tile(tile)?.ep_regs(ep)).ok_or_else(|| Error::new(Code::NoMEP))?;
    mep.check_access(off, size, if read { Perm::R } else { Perm::W })
        .map_err(|e| {
            log_tcu!(
                "{}:EP{}: invalid access of {} bytes at {:#x} ({:?})",
                tile,
                ep,
                size,
                off,
                e.code()
            );
            e
        })?;

    let remote = m
        .mem(mep.tile)?
        .translate(mep.addr + off, size)
        .ok_or_else(|| Error::new(Code::OutOfBounds))?;
    let (dst, src) = if read { (data, remote) } else { (remote, data) };
    // safety: the remote range has been checked and the runtime passes a valid local buffer
    unsafe {
        libc::memmove(dst as *mut libc::c_void, src as *const libc::c_void, size)
    };

    log_tcu!(
        "{}:EP{}: {} {} bytes {} {}:{:#x}",
        tile,
        ep,
        if read { "read" } else { "wrote" },
        size,
        if read { "from" } else { "to" },
        mep.tile,
        mep.addr + off
    );
    Ok(())
}

fn fetch(st: &mut State, tile: TileId, ep: EpId) -> Result<Option<usize>, Error> {
    check_ep(ep)?;
    let ts = st.tile_mut(tile)?;
    let mut rep = RecvEp::from_regs(&ts.ep_regs(ep)).ok_or_else(|| Error::new(Code::NoREP))?;
    let res = rep.fetch();
    if let Some(off) = res {
        ts.set_ep_regs(ep, &rep.to_regs());
        log_tcu!("{}:EP{}: fetched message at offset {:#x}", tile, ep, off);
    }
    Ok(res)
}

fn ack(st: &mut State, tile: TileId, ep: EpId, off: usize) -> Result<(), Error> {
    check_ep(ep)?;
    let ts = st.tile_mut(tile)?;
    let mut rep = RecvEp::from_regs(&ts.ep_regs(ep)).ok_or_else(|| Error::new(Code::NoREP))?;
    let slot = rep.ack(off)?;
    ts.set_ep_regs(ep, &rep.to_regs());
    // acking a message also invalidates the reply capability
    if let Some(reply_eps) = rep.reply_eps {
        ts.set_ep_regs(reply_eps + slot as EpId, &[0; EP_REGS]);
    }
    log_tcu!("{}:EP{}: acked message at slot {}", tile, ep, slot);
    Ok(())
}

/// Returns whether receive EP `ep` on `tile` has unread messages
pub(crate) fn has_unread(st: &State, tile: TileId, ep: EpId) -> bool {
    if ep == INVALID_EP || check_ep(ep).is_err() {
        return false;
    }
    st.tile(tile)
        .ok()
        .and_then(|ts| RecvEp::from_regs(&ts.ep_regs(ep)))
        .map(|rep| rep.unread != 0)
        .unwrap_or(false)
}

/// Invalidates EP `ep` on `tile`
pub(crate) fn invalidate_ep(
    st: &mut State,
    tile: TileId,
    ep: EpId,
    force: bool,
) -> Result<(), Error> {
    check_ep(ep)?;
    let ts = st.tile_mut(tile)?;
    let regs = ts.ep_regs(ep);
    if !force {
        if let Some(sep) = SendEp::from_regs(&regs) {
            if !sep.unlimited() && sep.cur_crd < sep.max_crd {
                return Err(Error::new(Code::NoPerm));
            }
        }
    }

    if EpType::of(&regs) != EpType::Invalid {
        ts.set_ep_regs(ep, &[0; EP_REGS]);
        ts.events |= EventMask::EP_INVAL;
        log_tcu!("{}:EP{}: invalidated", tile, ep);
    }
    Ok(())
}
