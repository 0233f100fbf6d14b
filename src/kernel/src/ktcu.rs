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

//! The kernel's use of the TCU
//!
//! The kernel owns the endpoints of its own tile. The receive buffers are placed at fixed
//! positions in the receive-buffer area of the kernel tile. Endpoints on other tiles are
//! configured through the machine, which corresponds to the external interface of the TCU.

use base::cfg;
use base::errors::Error;
use base::io::LogFlags;
use base::kif;
use base::log;
use base::loopback::Machine;
use base::mem::{self, GlobOff};
use base::tcu::{
    ActId, EpId, Header, Label, Message, Reg, TileId, EP_REGS, TCU, UNLIM_CREDITS,
};

/// The activity id the kernel uses for its endpoints
pub const KERNEL_ID: ActId = 0xFFFE;

/// Receives system calls
pub const KSYS_EP: EpId = 0;
/// Receives the replies from services
pub const KSRV_EP: EpId = 1;
/// Receives the exit notifications of the tiles
pub const KTMUX_EP: EpId = 2;
/// Receives the requests for the resource manager
pub const KRES_EP: EpId = 3;
/// Temporary endpoint for messages and memory accesses to other tiles
pub const KTMP_EP: EpId = 4;

const FIRST_REPLY_EP: EpId = 8;

struct RecvBuf {
    ep: EpId,
    off: usize,
    ord: u32,
    msg_ord: u32,
    replies: bool,
}

const RBUFS: [RecvBuf; 4] = [
    RecvBuf {
        ep: KSYS_EP,
        off: 0,
        ord: 14,
        msg_ord: cfg::SYSC_RBUF_ORD,
        replies: true,
    },
    RecvBuf {
        ep: KSRV_EP,
        off: 0x4000,
        ord: 13,
        msg_ord: 8,
        replies: false,
    },
    RecvBuf {
        ep: KTMUX_EP,
        off: 0x6000,
        ord: 10,
        msg_ord: 5,
        replies: false,
    },
    RecvBuf {
        ep: KRES_EP,
        off: 0x8000,
        ord: 14,
        msg_ord: cfg::SYSC_RBUF_ORD,
        replies: true,
    },
];

fn rbuf(ep: EpId) -> &'static RecvBuf {
    // the kernel only fetches from its own receive endpoints
    &RBUFS[ep as usize]
}

fn rbuf_addr(ep: EpId) -> usize {
    cfg::RBUF_ADDR + rbuf(ep).off
}

/// Returns the order and message order of the given receive endpoint
pub fn rbuf_orders(ep: EpId) -> (u32, u32) {
    (rbuf(ep).ord, rbuf(ep).msg_ord)
}

/// Returns the address of the receive buffer of the given receive endpoint
pub fn rbuf_location(ep: EpId) -> GlobOff {
    rbuf_addr(ep) as GlobOff
}

/// Configures the kernel's receive endpoints
pub fn init() {
    let mut reply_eps = FIRST_REPLY_EP;
    for rb in &RBUFS {
        let replies = if rb.replies {
            let first = reply_eps;
            reply_eps += 1 << (rb.ord - rb.msg_ord);
            Some(first)
        }
        else {
            None
        };
        config_local_ep(rb.ep, |regs| {
            *regs = TCU::config_recv(
                KERNEL_ID,
                rbuf_addr(rb.ep) as GlobOff,
                rb.ord,
                rb.msg_ord,
                replies,
            );
        });
    }
    log!(
        LogFlags::KernEPs,
        "Kernel EPs ready; reply EPs {}..{}",
        FIRST_REPLY_EP,
        reply_eps
    );
}

pub fn config_local_ep<CFG>(ep: EpId, cfg: CFG)
where
    CFG: FnOnce(&mut [Reg; EP_REGS]),
{
    let mut regs = [0; EP_REGS];
    cfg(&mut regs);
    TCU::set_ep_regs(ep, &regs);
}

pub fn config_remote_ep<CFG>(machine: &Machine, tile: TileId, ep: EpId, cfg: CFG) -> Result<(), Error>
where
    CFG: FnOnce(&mut [Reg; EP_REGS]),
{
    let mut regs = [0; EP_REGS];
    cfg(&mut regs);
    log!(LogFlags::KernEPs, "Configuring {}:EP{} with {:x?}", tile, ep, regs);
    machine.set_ep_regs(tile, ep, &regs)
}

pub fn invalidate_ep_remote(machine: &Machine, tile: TileId, ep: EpId, force: bool) -> Result<(), Error> {
    log!(LogFlags::KernEPs, "Invalidating {}:EP{} (force={})", tile, ep, force);
    machine.invalidate_ep(tile, ep, force)
}

pub fn fetch_msg(rep: EpId) -> Option<&'static Message> {
    TCU::fetch_msg(rep).map(|off| TCU::offset_to_msg(rbuf_addr(rep), off))
}

pub fn ack_msg(rep: EpId, msg: &Message) {
    let off = TCU::msg_to_offset(rbuf_addr(rep), msg);
    if let Err(e) = TCU::ack_msg(rep, off) {
        log!(LogFlags::Error, "Unable to ack message at {:#x}: {:?}", off, e);
    }
}

pub fn drop_msgs(rep: EpId, label: Label) {
    TCU::drop_msgs_with(rbuf_addr(rep), rep, label);
}

pub fn send_to(
    tile: TileId,
    ep: EpId,
    lbl: Label,
    msg: &mem::MsgBuf,
    rpl_lbl: Label,
    rpl_ep: EpId,
) -> Result<(), Error> {
    config_local_ep(KTMP_EP, |regs| {
        // the receiver checks the size against its slots anyway
        debug_assert!(msg.size() + mem::size_of::<Header>() <= 1 << cfg::SYSC_RBUF_ORD);
        *regs = TCU::config_send(KERNEL_ID, lbl, tile, ep, cfg::SYSC_RBUF_ORD, UNLIM_CREDITS);
    });
    log!(
        LogFlags::TCU,
        "Sending {} bytes to {}:EP{} (lbl={:#x}, rlbl={:#x})",
        msg.size(),
        tile,
        ep,
        lbl,
        rpl_lbl
    );
    TCU::send(KTMP_EP, msg, rpl_lbl, rpl_ep)
}

/// Replies to `msg`, which was received on `ep`
///
/// If the reply cannot be delivered, the message is acknowledged nevertheless.
pub fn reply(ep: EpId, reply: &mem::MsgBuf, msg: &Message) -> Result<(), Error> {
    let msg_off = TCU::msg_to_offset(rbuf_addr(ep), msg);
    let res = TCU::reply(ep, reply, msg_off);
    if let Err(ref e) = res {
        log!(LogFlags::Error, "Reply to {:?} failed: {:?}", msg.header, e);
        TCU::ack_msg(ep, msg_off).ok();
    }
    res
}

pub fn try_write_mem(tile: TileId, addr: GlobOff, data: &[u8]) -> Result<(), Error> {
    config_local_ep(KTMP_EP, |regs| {
        *regs = TCU::config_mem(KERNEL_ID, tile, addr, data.len() as GlobOff, kif::Perm::W);
    });
    log!(LogFlags::TCU, "Writing {} bytes to {}:{:#x}", data.len(), tile, addr);
    TCU::write(KTMP_EP, data.as_ptr(), data.len(), 0)
}
