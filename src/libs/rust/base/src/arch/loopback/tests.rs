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

use std::sync::Arc;

use crate::cfg;
use crate::errors::{Code, Error};
use crate::kif::{Perm, TileAttr, TileDesc, TileISA, TileType};
use crate::mem::{GlobOff, MsgBuf};
use crate::tcu::{EventMask, TileId, NO_REPLIES, TCU};

use super::Machine;

const SND: TileId = TileId::new(0, 0);
const RCV: TileId = TileId::new(0, 1);
const MEM: TileId = TileId::new(0, 2);

fn machine() -> Arc<Machine> {
    let comp = TileDesc::new_with_attr(TileType::Comp, TileISA::X86, 0, TileAttr::IMEM);
    Machine::new(&[
        comp,
        comp,
        TileDesc::new(TileType::Mem, TileISA::None, 0x10000),
    ])
}

fn run_on<F>(m: &Arc<Machine>, tile: TileId, func: F) -> Code
where
    F: FnOnce() -> Result<(), Error> + Send + 'static,
{
    m.spawn(tile, "test", func).unwrap().join().unwrap()
}

fn msg_buf(bytes: &[u8]) -> MsgBuf {
    let mut buf = MsgBuf::new();
    buf.set_from_slice(bytes);
    buf
}

// tile RCV: EP0 receives with 16 slots of 64 bytes and reply EPs 8..24
// tile SND: EP0 sends to RCV:EP0 with 2 credits, EP1 receives replies
fn setup_channel(m: &Arc<Machine>, credits: u32) {
    let rbuf = cfg::RBUF_ADDR as GlobOff;
    m.set_ep_regs(RCV, 0, &TCU::config_recv(0, rbuf, 10, 6, Some(8)))
        .unwrap();
    m.set_ep_regs(SND, 0, &TCU::config_send(0, 0x1234, RCV, 0, 6, credits))
        .unwrap();
    m.set_ep_regs(SND, 1, &TCU::config_recv(0, rbuf, 8, 6, None))
        .unwrap();
}

#[test]
fn credits_and_replies() {
    let m = machine();
    setup_channel(&m, 2);

    let res = run_on(&m, SND, || {
        let buf = msg_buf(b"0123456789abcdef");
        TCU::send(0, &buf, 0x55, 1)?;
        TCU::send(0, &buf, 0x56, 1)?;
        assert_eq!(
            TCU::send(0, &buf, 0x57, 1).map_err(|e| e.code()),
            Err(Code::MissCredits)
        );
        assert_eq!(TCU::credits(0), Ok(0));
        assert!(TCU::has_missing_credits(0));
        Ok(())
    });
    assert_eq!(res, Code::Success);

    let res = run_on(&m, RCV, || {
        let base = cfg::RBUF_ADDR;
        assert!(TCU::has_msgs(0));
        let off = TCU::fetch_msg(0).unwrap();
        let msg = TCU::offset_to_msg(base, off);
        assert_eq!(msg.header.label(), 0x1234);
        assert_eq!(msg.header.reply_label(), 0x55);
        assert_eq!(msg.header.sender_tile(), SND);
        assert_eq!(&msg.data[0..16], b"0123456789abcdef");
        TCU::reply(0, &msg_buf(b"reply"), off)?;
        // the reply acknowledged the message
        assert_eq!(TCU::unread_count(0), 1);
        Ok(())
    });
    assert_eq!(res, Code::Success);

    let res = run_on(&m, SND, || {
        assert_eq!(TCU::credits(0), Ok(1));
        let off = TCU::fetch_msg(1).unwrap();
        let reply = TCU::offset_to_msg(cfg::RBUF_ADDR, off);
        assert_eq!(reply.header.label(), 0x55);
        assert_eq!(&reply.data[0..5], b"reply");
        TCU::ack_msg(1, off)?;
        assert!(TCU::fetch_events().contains(EventMask::CRD_RECV));
        TCU::send(0, &msg_buf(b"again"), 0x57, 1)
    });
    assert_eq!(res, Code::Success);
}

#[test]
fn refill_after_invalidation_is_dropped() {
    let m = machine();
    setup_channel(&m, 1);

    assert_eq!(
        run_on(&m, SND, || TCU::send(0, &msg_buf(b"hi"), 0, 1)),
        Code::Success
    );
    m.invalidate_ep(SND, 0, true).unwrap();

    let res = run_on(&m, RCV, || {
        let off = TCU::fetch_msg(0).unwrap();
        TCU::reply(0, &msg_buf(b"late"), off)
    });
    assert_eq!(res, Code::Success);
    assert_eq!(m.read_ep_regs(SND, 0).unwrap(), [0; 3]);
}

#[test]
fn receiver_gone() {
    let m = machine();
    setup_channel(&m, 2);
    m.invalidate_ep(RCV, 0, true).unwrap();

    let res = run_on(&m, SND, || TCU::send(0, &msg_buf(b"hi"), 0, NO_REPLIES));
    assert_eq!(res, Code::RecvGone);
    // the credit has not been consumed
    let res = run_on(&m, SND, || {
        assert_eq!(TCU::credits(0), Ok(2));
        Ok(())
    });
    assert_eq!(res, Code::Success);
}

#[test]
fn drop_by_label() {
    let m = machine();
    let rbuf = cfg::RBUF_ADDR as GlobOff;
    m.set_ep_regs(RCV, 0, &TCU::config_recv(0, rbuf, 10, 6, None))
        .unwrap();
    m.set_ep_regs(SND, 0, &TCU::config_send(0, 1, RCV, 0, 6, 8))
        .unwrap();
    m.set_ep_regs(SND, 1, &TCU::config_send(0, 2, RCV, 0, 6, 8))
        .unwrap();

    let res = run_on(&m, SND, || {
        for ep in [0, 1, 0, 1, 0] {
            TCU::send(ep, &msg_buf(b"x"), 0, NO_REPLIES)?;
        }
        Ok(())
    });
    assert_eq!(res, Code::Success);

    let res = run_on(&m, RCV, || {
        assert_eq!(TCU::unread_count(0), 5);
        TCU::drop_msgs_with(cfg::RBUF_ADDR, 0, 1);
        assert_eq!(TCU::unread_count(0), 2);
        while let Some(off) = TCU::fetch_msg(0) {
            let msg = TCU::offset_to_msg(cfg::RBUF_ADDR, off);
            assert_eq!(msg.header.label(), 2);
            TCU::ack_msg(0, off)?;
        }
        Ok(())
    });
    assert_eq!(res, Code::Success);
}

#[test]
fn memory_access() {
    let m = machine();
    m.set_ep_regs(SND, 2, &TCU::config_mem(0, MEM, 0x1000, 0x1000, Perm::RW))
        .unwrap();
    m.set_ep_regs(SND, 3, &TCU::config_mem(0, MEM, 0x1000, 0x1000, Perm::R))
        .unwrap();

    let res = run_on(&m, SND, || {
        let data = [0xAAu8; 64];
        TCU::write(2, data.as_ptr(), data.len(), 0xFC0)?;
        let mut back = [0u8; 64];
        TCU::read(3, back.as_mut_ptr(), back.len(), 0xFC0)?;
        assert_eq!(back, data);

        assert_eq!(
            TCU::write(3, data.as_ptr(), 1, 0).map_err(|e| e.code()),
            Err(Code::NoPerm)
        );
        assert_eq!(
            TCU::read(2, back.as_mut_ptr(), 64, 0xFC1).map_err(|e| e.code()),
            Err(Code::OutOfBounds)
        );
        Ok(())
    });
    assert_eq!(res, Code::Success);

    let mut buf = [0u8; 4];
    m.read_mem(MEM, 0x1FC0, &mut buf).unwrap();
    assert_eq!(buf, [0xAA; 4]);
}

#[test]
fn exit_notification() {
    let m = machine();
    let rbuf = cfg::RBUF_ADDR as GlobOff;
    m.set_ep_regs(SND, 5, &TCU::config_recv(0, rbuf, 10, 6, None))
        .unwrap();
    m.set_exit_notify(SND, 5);

    assert_eq!(
        run_on(&m, RCV, || Err(Error::new(Code::NoSpace))),
        Code::NoSpace
    );
    assert_eq!(
        run_on(&m, RCV, || crate::tmif::exit(Code::EndOfFile)),
        Code::EndOfFile
    );

    let res = run_on(&m, SND, || {
        let mut codes = std::vec::Vec::new();
        while let Some(off) = TCU::fetch_msg(5) {
            let msg = TCU::offset_to_msg(cfg::RBUF_ADDR, off);
            assert_eq!(msg.as_words()[0], RCV.raw() as u64);
            codes.push(msg.as_words()[1]);
            TCU::ack_msg(5, off)?;
        }
        assert_eq!(codes, [Code::NoSpace as u64, Code::EndOfFile as u64]);
        Ok(())
    });
    assert_eq!(res, Code::Success);
}

#[test]
fn sleep_with_timeout() {
    let m = machine();
    let res = run_on(&m, SND, || {
        let start = TCU::nanotime();
        TCU::wait_for_msg(
            crate::tcu::INVALID_EP,
            Some(crate::time::TimeDuration::from_millis(5)),
        )?;
        assert!(TCU::nanotime() - start >= 5_000_000);
        Ok(())
    });
    assert_eq!(res, Code::Success);
}

#[test]
fn commands_are_counted() {
    let m = machine();
    let res = run_on(&m, SND, || {
        let before = TCU::command_count();
        TCU::fetch_events();
        assert_eq!(TCU::command_count(), before + 1);
        Ok(())
    });
    assert_eq!(res, Code::Success);
}
