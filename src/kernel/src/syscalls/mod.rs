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

use base::build_vmsg;
use base::errors::{Code, Error};
use base::io::LogFlags;
use base::kif;
use base::log;
use base::mem::MsgBuf;
use base::serialize::{Deserialize, M3Deserializer};
use base::tcu::{ActId, Message};

use crate::ktcu;
use crate::state::Kernel;

macro_rules! sysc_log {
    ($act:expr, $fmt:tt) => (
        base::log!(base::io::LogFlags::KernSysc, concat!("{}: syscall::", $fmt), $act)
    );
    ($act:expr, $fmt:tt, $($args:tt)*) => (
        base::log!(
            base::io::LogFlags::KernSysc,
            concat!("{}: syscall::", $fmt),
            $act, $($args)*
        )
    );
}

macro_rules! sysc_err {
    ($e:expr, $fmt:tt) => ({
        return Err(base::errors::VerboseError::new($e, base::col::ToString::to_string($fmt)));
    });
    ($e:expr, $fmt:tt, $($args:tt)*) => ({
        return Err(base::errors::VerboseError::new($e, base::format!($fmt, $($args)*)));
    });
}

macro_rules! get_kobj {
    ($k:expr, $act:expr, $sel:expr, $ty:ident) => {{
        match $k.caps.obj($act, $sel) {
            Some($crate::cap::KObject::$ty(o)) => o.clone(),
            Some(_) => sysc_err!(base::errors::Code::InvArgs, "Expected {} cap", stringify!($ty)),
            None => sysc_err!(base::errors::Code::InvArgs, "Invalid capability {}", $sel),
        }
    }};
}

macro_rules! check_unused {
    ($k:expr, $act:expr, $sel:expr) => {
        if !$k.caps.unused($act, $sel) {
            sysc_err!(base::errors::Code::InvArgs, "Selector {} already in use", $sel);
        }
    };
}

mod create;
mod derive;
mod exchange;
mod misc;

pub use self::exchange::finish_exchange_sess;
pub use self::misc::retry_activations;

fn send_reply(msg: &'static Message, rep: &MsgBuf) {
    ktcu::reply(ktcu::KSYS_EP, rep, msg).ok();
}

fn reply_result(msg: &'static Message, error: Code) {
    let mut rep_buf = MsgBuf::new();
    build_vmsg!(rep_buf, kif::DefaultReply { error });
    send_reply(msg, &rep_buf);
}

fn reply_success(msg: &'static Message) {
    reply_result(msg, Code::Success);
}

fn get_request<R: Deserialize<'static>>(msg: &'static Message) -> Result<R, Error> {
    let mut de = M3Deserializer::new(msg.as_words());
    de.skip(1);
    de.pop()
}

/// Handles the system call `msg` on [`KSYS_EP`](ktcu::KSYS_EP)
///
/// The sender is identified by the label of the message. Operations either reply directly or
/// store the message to reply later.
pub fn handle(k: &mut Kernel, msg: &'static Message) {
    use kif::syscalls::Operation;

    let act = msg.header.label() as ActId;
    if !k.acts.contains_key(&act) {
        log!(LogFlags::KernSysc, "Dropping syscall of unknown activity {}", act);
        ktcu::ack_msg(ktcu::KSYS_EP, msg);
        return;
    }

    let opcode = msg.as_words().first().copied().unwrap_or(u64::MAX);
    let op = match Operation::try_from(opcode) {
        Ok(op) => op,
        Err(_) => {
            log!(LogFlags::Error, "{}: invalid syscall {}", act, opcode);
            reply_result(msg, Code::InvArgs);
            return;
        },
    };

    let res = match op {
        Operation::CreateSrv => create::create_srv(k, act, msg),
        Operation::CreateSess => create::create_sess(k, act, msg),
        Operation::CreateMGate => create::create_mgate(k, act, msg),
        Operation::CreateRGate => create::create_rgate(k, act, msg),
        Operation::CreateSGate => create::create_sgate(k, act, msg),
        Operation::CreateMap => create::create_map(k, act, msg),
        Operation::CreateAct => create::create_activity(k, act, msg),
        Operation::CreateSem => create::create_sem(k, act, msg),
        Operation::AllocEPs => create::alloc_eps(k, act, msg),

        Operation::Activate => misc::activate(k, act, msg),
        Operation::ActCtrl => misc::activity_ctrl(k, act, msg),
        Operation::ActWait => misc::activity_wait(k, act, msg),
        Operation::DeriveMem => derive::derive_mem(k, act, msg),
        Operation::DeriveKMem => derive::derive_kmem(k, act, msg),
        Operation::DeriveTile => derive::derive_tile(k, act, msg),
        Operation::MGateRegion => misc::mgate_region(k, act, msg),
        Operation::RGateBuffer => misc::rgate_buffer(k, act, msg),
        Operation::KMemQuota => misc::kmem_quota(k, act, msg),
        Operation::TileQuota => misc::tile_quota(k, act, msg),
        Operation::SemCtrl => misc::sem_ctrl(k, act, msg),

        Operation::Delegate => exchange::exchange_sess(k, act, msg, false),
        Operation::Obtain => exchange::exchange_sess(k, act, msg, true),
        Operation::Exchange => exchange::exchange(k, act, msg),
        Operation::Revoke => exchange::revoke(k, act, msg),

        Operation::Noop => misc::noop(k, act, msg),
    };

    if let Err(e) = res {
        log!(
            LogFlags::Error,
            "\x1B[37;41m{}: {:?} failed: {} ({:?})\x1B[0m",
            act,
            op,
            e.msg(),
            e.code()
        );
        reply_result(msg, e.code());
    }

    if !k.activations.is_empty() {
        retry_activations(k);
    }
}
