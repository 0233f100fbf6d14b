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

//! Contains the system call wrapper functions
//!
//! Every system call is sent over the syscall send gate of the own activity and the reply is
//! received on the syscall receive gate. Both use standard endpoints, so that no system call is
//! required to perform a system call.

use crate::build_vmsg;
use crate::cap::Selector;
use crate::errors::{Code, Error};
use crate::io::LogFlags;
use crate::kif::{syscalls, CapRngDesc, Perm};
use crate::log;
use crate::mem::{GlobOff, MsgBuf};
use crate::quota::Quota;
use crate::serialize::{Deserialize, M3Deserializer};
use crate::tcu::{ActId, EpId, Label, Message, TileId};
use crate::tiles::Activity;

struct Reply<R> {
    msg: &'static Message,
    data: R,
}

impl<R> Drop for Reply<R> {
    fn drop(&mut self) {
        Activity::own().syscall_rgate().ack_msg(self.msg).ok();
    }
}

fn send_receive<R: Deserialize<'static>>(
    op: syscalls::Operation,
    buf: &MsgBuf,
) -> Result<Reply<R>, Error> {
    let own = Activity::own();
    let rgate = own.syscall_rgate();
    let reply_raw = own
        .syscall_sgate()
        .call(buf, rgate)
        .map_err(|e| e.with_origin(op.name()))?;

    let mut de = M3Deserializer::new(reply_raw.as_words());
    let res: Code = de.pop().unwrap_or(Code::InvArgs);
    if res != Code::Success {
        rgate.ack_msg(reply_raw)?;
        log!(LogFlags::LibSysc, "syscall {} failed: {:?}", op.name(), res);
        return Err(Error::new_with_origin(res, op.name()));
    }

    match de.pop() {
        Ok(data) => Ok(Reply {
            msg: reply_raw,
            data,
        }),
        Err(e) => {
            rgate.ack_msg(reply_raw)?;
            Err(e.with_origin(op.name()))
        },
    }
}

fn send_receive_result(op: syscalls::Operation, buf: &MsgBuf) -> Result<(), Error> {
    #[derive(Deserialize)]
    #[serde(crate = "base::serde")]
    struct Empty {}

    send_receive::<Empty>(op, buf).map(|_| ())
}

macro_rules! syscall {
    ($op:ident, $req:expr) => {{
        let mut buf = MsgBuf::new();
        build_vmsg!(buf, syscalls::Operation::$op, $req);
        log!(LogFlags::LibSysc, "syscall {}", syscalls::Operation::$op.name());
        send_receive(syscalls::Operation::$op, &buf)
    }};
}

macro_rules! syscall_result {
    ($op:ident, $req:expr) => {{
        let mut buf = MsgBuf::new();
        build_vmsg!(buf, syscalls::Operation::$op, $req);
        log!(LogFlags::LibSysc, "syscall {}", syscalls::Operation::$op.name());
        send_receive_result(syscalls::Operation::$op, &buf)
    }};
}

/// Creates a new service named `name` at selector `dst`. The receive gate `rgate` will be used for
/// service calls from the kernel to the server.
pub fn create_srv(dst: Selector, rgate: Selector, name: &str) -> Result<(), Error> {
    syscall_result!(CreateSrv, syscalls::CreateSrv { dst, rgate, name })
}

/// Creates a new session at selector `dst` for the service `srv`. The kernel passes `ident` to the
/// server with every request for this session.
pub fn create_sess(dst: Selector, srv: Selector, ident: u64) -> Result<(), Error> {
    syscall_result!(CreateSess, syscalls::CreateSess { dst, srv, ident })
}

/// Creates a new memory gate at selector `dst` that refers to the address region
/// `addr`..`addr`+`size` of activity `act`.
pub fn create_mgate(
    dst: Selector,
    act: Selector,
    addr: GlobOff,
    size: GlobOff,
    perms: Perm,
) -> Result<(), Error> {
    syscall_result!(CreateMGate, syscalls::CreateMGate {
        dst,
        act,
        addr,
        size,
        perms,
    })
}

/// Creates a new receive gate at selector `dst` with a `2^order` bytes receive buffer and
/// `2^msg_order` bytes message slots.
pub fn create_rgate(dst: Selector, order: u32, msg_order: u32) -> Result<(), Error> {
    syscall_result!(CreateRGate, syscalls::CreateRGate {
        dst,
        order,
        msg_order,
    })
}

/// Creates a new send gate at selector `dst` for receive gate `rgate` using the given label and
/// credit amount (in messages).
pub fn create_sgate(
    dst: Selector,
    rgate: Selector,
    label: Label,
    credits: u32,
) -> Result<(), Error> {
    syscall_result!(CreateSGate, syscalls::CreateSGate {
        dst,
        rgate,
        label,
        credits,
    })
}

/// Creates a mapping at page `first` of activity `act` for `pages` pages of memory gate `mgate`.
pub fn create_map(
    dst: Selector,
    act: Selector,
    mgate: Selector,
    first: Selector,
    pages: Selector,
    perms: Perm,
) -> Result<(), Error> {
    syscall_result!(CreateMap, syscalls::CreateMap {
        dst,
        act,
        mgate,
        first,
        pages,
        perms,
    })
}

/// Creates a new activity named `name` at selector `dst` on tile `tile` with kernel memory `kmem`.
///
/// Returns the id of the activity and its first standard endpoint.
pub fn create_activity(
    dst: Selector,
    name: &str,
    tile: Selector,
    kmem: Selector,
) -> Result<(ActId, EpId), Error> {
    let reply: Reply<syscalls::CreateActivityReply> =
        syscall!(CreateAct, syscalls::CreateActivity {
            dst,
            tile,
            kmem,
            name,
        })?;
    Ok((reply.data.id, reply.data.eps_start))
}

/// Creates a new semaphore at selector `dst` with initial value `value`.
pub fn create_sem(dst: Selector, value: u32) -> Result<(), Error> {
    syscall_result!(CreateSem, syscalls::CreateSem { dst, value })
}

/// Allocates an endpoint for activity `act` at selector `dst`, optionally at endpoint `epid`, and
/// reserves `replies` endpoints for reply capabilities behind it.
pub fn alloc_ep(
    dst: Selector,
    act: Selector,
    epid: Option<EpId>,
    replies: u32,
) -> Result<EpId, Error> {
    let reply: Reply<syscalls::AllocEPReply> = syscall!(AllocEPs, syscalls::AllocEP {
        dst,
        act,
        epid,
        replies,
    })?;
    Ok(reply.data.ep)
}

/// Activates the gate `gate` on endpoint `ep`. Receive gates need the address `rbuf_addr` of their
/// receive buffer. An invalid gate selector invalidates the endpoint.
pub fn activate(ep: Selector, gate: Selector, rbuf_addr: GlobOff) -> Result<(), Error> {
    syscall_result!(Activate, syscalls::Activate {
        ep,
        gate,
        rbuf_addr,
    })
}

/// Performs the activity operation `op` with argument `arg` on activity `act`.
pub fn activity_ctrl(act: Selector, op: syscalls::ActivityOp, arg: u64) -> Result<(), Error> {
    syscall_result!(ActCtrl, syscalls::ActivityCtrl { act, op, arg })
}

/// Waits until one of the activities in `acts` exits.
///
/// With `event` = 0, the call blocks and returns the selector and exit code of the activity.
/// Otherwise, the call returns immediately and the result is delivered by an upcall with given
/// event. In this case, the returned selector is [`INVALID_SEL`](crate::kif::INVALID_SEL) unless
/// an activity has already exited.
pub fn activity_wait(acts: &[Selector], event: u64) -> Result<(Selector, Code), Error> {
    let mut req = syscalls::ActivityWait {
        event,
        act_count: acts.len(),
        acts: [0; syscalls::MAX_WAIT_ACTS],
    };
    if acts.len() > syscalls::MAX_WAIT_ACTS {
        return Err(Error::new(Code::InvArgs));
    }
    req.acts[0..acts.len()].copy_from_slice(acts);

    let reply: Reply<syscalls::ActivityWaitReply> = syscall!(ActWait, req)?;
    Ok((reply.data.act_sel, reply.data.exitcode))
}

/// Derives a new memory gate at selector `dst` for activity `act` from `src`, covering the region
/// `offset`..`offset`+`size` with permissions `perms`.
pub fn derive_mem(
    act: Selector,
    dst: Selector,
    src: Selector,
    offset: GlobOff,
    size: GlobOff,
    perms: Perm,
) -> Result<(), Error> {
    syscall_result!(DeriveMem, syscalls::DeriveMem {
        act,
        dst,
        src,
        offset,
        size,
        perms,
    })
}

/// Derives a new kernel memory object at `dst` from `kmem` with `quota` bytes.
pub fn derive_kmem(kmem: Selector, dst: Selector, quota: usize) -> Result<(), Error> {
    syscall_result!(DeriveKMem, syscalls::DeriveKMem { kmem, dst, quota })
}

/// Derives a new tile object at `dst` from `tile`, optionally moving `eps` endpoints to it.
pub fn derive_tile(tile: Selector, dst: Selector, eps: Option<u32>) -> Result<(), Error> {
    syscall_result!(DeriveTile, syscalls::DeriveTile { tile, dst, eps })
}

/// Returns the tile, address, and size of the memory region of memory gate `mgate`.
pub fn mgate_region(mgate: Selector) -> Result<(TileId, GlobOff, GlobOff), Error> {
    let reply: Reply<syscalls::MGateRegionReply> =
        syscall!(MGateRegion, syscalls::MGateRegion { mgate })?;
    Ok((reply.data.tile, reply.data.addr, reply.data.size))
}

/// Returns the buffer and message order of the activated receive gate `rgate`.
pub fn rgate_buffer(rgate: Selector) -> Result<(u32, u32), Error> {
    let reply: Reply<syscalls::RGateBufferReply> =
        syscall!(RGateBuffer, syscalls::RGateBuffer { rgate })?;
    Ok((reply.data.order, reply.data.msg_order))
}

/// Returns the quota of the kernel memory object `kmem`.
pub fn kmem_quota(kmem: Selector) -> Result<Quota<usize>, Error> {
    let reply: Reply<syscalls::KMemQuotaReply> =
        syscall!(KMemQuota, syscalls::KMemQuota { kmem })?;
    Ok(Quota::new(reply.data.id, reply.data.total, reply.data.left))
}

/// Returns the endpoint quota of the tile object `tile`.
pub fn tile_quota(tile: Selector) -> Result<Quota<u32>, Error> {
    let reply: Reply<syscalls::TileQuotaReply> =
        syscall!(TileQuota, syscalls::TileQuota { tile })?;
    Ok(Quota::new(
        reply.data.eps_id,
        reply.data.eps_total,
        reply.data.eps_left,
    ))
}

/// Performs the semaphore operation `op` on semaphore `sem`. [`Down`](syscalls::SemOp::Down)
/// blocks until the value is positive.
pub fn sem_ctrl(sem: Selector, op: syscalls::SemOp) -> Result<(), Error> {
    syscall_result!(SemCtrl, syscalls::SemCtrl { sem, op })
}

fn exchange_sess(
    op: syscalls::Operation,
    act: Selector,
    sess: Selector,
    crd: CapRngDesc,
    args: &mut syscalls::ExchangeArgs,
) -> Result<(), Error> {
    let mut buf = MsgBuf::new();
    build_vmsg!(buf, op, syscalls::ExchangeSess {
        act,
        sess,
        crd,
        args: *args,
    });
    log!(LogFlags::LibSysc, "syscall {}", op.name());
    let reply: Reply<syscalls::ExchangeSessReply> = send_receive(op, &buf)?;
    *args = reply.data.args;
    Ok(())
}

/// Delegates the capabilities `crd` of activity `act` via the session `sess` to the server. The
/// arguments are passed to the server and replaced by its reply.
pub fn delegate(
    act: Selector,
    sess: Selector,
    crd: CapRngDesc,
    args: &mut syscalls::ExchangeArgs,
) -> Result<(), Error> {
    exchange_sess(syscalls::Operation::Delegate, act, sess, crd, args)
}

/// Obtains capabilities from the server of session `sess` into `crd` of activity `act`. The
/// arguments are passed to the server and replaced by its reply.
pub fn obtain(
    act: Selector,
    sess: Selector,
    crd: CapRngDesc,
    args: &mut syscalls::ExchangeArgs,
) -> Result<(), Error> {
    exchange_sess(syscalls::Operation::Obtain, act, sess, crd, args)
}

/// Exchanges capabilities between the own activity and `act`: delegates `own` to `other` in `act`
/// or, with `obtain`, obtains `other` of `act` into `own`.
pub fn exchange(
    act: Selector,
    own: CapRngDesc,
    other: Selector,
    obtain: bool,
) -> Result<(), Error> {
    syscall_result!(Exchange, syscalls::Exchange {
        act,
        own,
        other,
        obtain,
    })
}

/// Revokes the capabilities `crd` of activity `act`. Without `own`, only the capabilities derived
/// from them are revoked.
pub fn revoke(act: Selector, crd: CapRngDesc, own: bool) -> Result<(), Error> {
    syscall_result!(Revoke, syscalls::Revoke { act, crd, own })
}

/// The noop system call for benchmarking
pub fn noop() -> Result<(), Error> {
    syscall_result!(Noop, syscalls::Noop {})
}
