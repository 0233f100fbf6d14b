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
use base::cfg;
use base::col::Vec;
use base::errors::{Code, VerboseError};
use base::kif::{self, syscalls};
use base::mem::{GlobOff, MsgBuf};
use base::rc::Rc;
use base::tcu::{ActId, Message, TCU};

use crate::cap::{EPObject, GateObject};
use crate::ktcu;
use crate::state::Kernel;
use crate::syscalls::{get_request, reply_result, reply_success, send_reply};
use crate::tiles;

pub fn activate(k: &mut Kernel, act: ActId, msg: &'static Message) -> Result<(), VerboseError> {
    if try_activate(k, act, msg)? {
        reply_success(msg);
    }
    else {
        sysc_log!(act, "activate: waiting for receive gate");
        k.activations.push((act, msg));
    }
    Ok(())
}

/// Retries all activations that wait for their receive gate
pub fn retry_activations(k: &mut Kernel) {
    let pending: Vec<_> = k.activations.drain(..).collect();
    for (act, msg) in pending {
        match try_activate(k, act, msg) {
            Ok(true) => reply_success(msg),
            Ok(false) => k.activations.push((act, msg)),
            Err(e) => reply_result(msg, e.code()),
        }
    }
}

fn try_activate(k: &mut Kernel, act: ActId, msg: &'static Message) -> Result<bool, VerboseError> {
    let r: syscalls::Activate = get_request(msg)?;
    sysc_log!(
        act,
        "activate(ep={}, gate={}, rbuf_addr={:#x})",
        r.ep,
        r.gate,
        r.rbuf_addr
    );

    let ep = get_kobj!(k, act, r.ep, EP);
    let gate = if r.gate == kif::INVALID_SEL {
        None
    }
    else {
        match k.kobj(act, r.gate).and_then(|o| o.to_gate()) {
            Some(g) => Some(g),
            None => sysc_err!(Code::InvArgs, "Capability {} is no gate", r.gate),
        }
    };

    match gate {
        // send gates can only be activated as soon as the receive gate is
        Some(GateObject::Send(ref s)) if !s.rgate().activated() => return Ok(false),
        Some(GateObject::Recv(ref rg)) if rg.activated() => {
            let same_ep = rg
                .gate_ep()
                .get_ep()
                .map(|e| Rc::ptr_eq(&e, &ep))
                .unwrap_or(false);
            if !same_ep {
                sysc_err!(Code::InvArgs, "Receive gate is already activated");
            }
        },
        _ => {},
    }

    // unbind the previous gate of the EP
    if k.deconfigure_ep(&ep).is_some() || gate.is_none() {
        ktcu::invalidate_ep_remote(&k.machine, ep.tile_id(), ep.ep(), true)?;
    }

    let gate = match gate {
        Some(g) => g,
        None => return Ok(true),
    };

    // a gate is bound to at most one EP
    if let Some(old) = gate.gate_ep().get_ep() {
        k.deconfigure_ep(&old);
        ktcu::invalidate_ep_remote(&k.machine, old.tile_id(), old.ep(), true)?;
    }

    let regs = match gate {
        GateObject::Mem(ref m) => TCU::config_mem(
            ep.activity(),
            m.tile_id(),
            m.addr(),
            m.size(),
            m.perms(),
        ),

        GateObject::Send(ref s) => {
            let (tile, rep) = match s.rgate().location() {
                Some(loc) => loc,
                None => sysc_err!(Code::InvArgs, "Receive gate is not activated"),
            };
            TCU::config_send(
                ep.activity(),
                s.label(),
                tile,
                rep,
                s.rgate().msg_order(),
                s.credits(),
            )
        },

        GateObject::Recv(ref rg) => {
            check_rbuf(rg.order(), r.rbuf_addr)?;
            let reply_eps = if ep.replies() > 0 {
                if ep.replies() < rg.slots() {
                    sysc_err!(
                        Code::InvArgs,
                        "Not enough reply EPs ({} for {} slots)",
                        ep.replies(),
                        rg.slots()
                    );
                }
                Some(ep.ep() + 1)
            }
            else {
                None
            };
            TCU::config_recv(
                ep.activity(),
                r.rbuf_addr,
                rg.order(),
                rg.msg_order(),
                reply_eps,
            )
        },
    };

    ktcu::config_remote_ep(&k.machine, ep.tile_id(), ep.ep(), |r| *r = regs)?;
    if let GateObject::Recv(ref rg) = gate {
        rg.activate(ep.tile_id(), ep.ep(), r.rbuf_addr);
    }
    EPObject::configure(&ep, gate);
    Ok(true)
}

fn check_rbuf(order: u32, addr: GlobOff) -> Result<(), VerboseError> {
    let start = cfg::RBUF_ADDR as GlobOff;
    let end = start + cfg::RBUF_SIZE as GlobOff;
    let size: GlobOff = 1 << order;
    let fits = addr.checked_add(size).map_or(false, |last| last <= end);
    if addr < start || !fits || addr % 8 != 0 {
        sysc_err!(
            Code::InvArgs,
            "Receive buffer {:#x}..{:#x} is outside of {:#x}..{:#x}",
            addr,
            addr.wrapping_add(size),
            start,
            end
        );
    }
    Ok(())
}

pub fn activity_ctrl(
    k: &mut Kernel,
    act: ActId,
    msg: &'static Message,
) -> Result<(), VerboseError> {
    let r: syscalls::ActivityCtrl = get_request(msg)?;
    sysc_log!(
        act,
        "activity_ctrl(act={}, op={:?}, arg={:#x})",
        r.act,
        r.op,
        r.arg
    );

    let target = get_kobj!(k, act, r.act, Activity);
    match r.op {
        syscalls::ActivityOp::Init => {},
        syscalls::ActivityOp::Start => {
            if target == act {
                sysc_err!(Code::InvArgs, "Activity can't start itself");
            }
            tiles::start_activity(k, target)?;
        },
        syscalls::ActivityOp::Stop => {
            tiles::stop_activity(k, target, Code::from(r.arg as u32))?;
        },
    }

    reply_success(msg);
    Ok(())
}

pub fn activity_wait(
    k: &mut Kernel,
    act: ActId,
    msg: &'static Message,
) -> Result<(), VerboseError> {
    let r: syscalls::ActivityWait = get_request(msg)?;
    if r.act_count == 0 || r.act_count > syscalls::MAX_WAIT_ACTS {
        sysc_err!(Code::InvArgs, "Invalid number of activities ({})", r.act_count);
    }
    let sels = &r.acts[0..r.act_count];
    sysc_log!(
        act,
        "activity_wait(acts={:?}, event={:#x})",
        sels,
        r.event
    );

    let (act_sel, exitcode) = match tiles::wait_activity(k, act, sels, r.event, msg)? {
        Some(res) => res,
        // asynchronous waits are confirmed now and finished by an upcall
        None if r.event != 0 => (kif::INVALID_SEL, Code::Success),
        None => return Ok(()),
    };

    let mut kreply = MsgBuf::new();
    build_vmsg!(kreply, Code::Success, syscalls::ActivityWaitReply {
        act_sel,
        exitcode
    });
    send_reply(msg, &kreply);
    Ok(())
}

pub fn mgate_region(
    k: &mut Kernel,
    act: ActId,
    msg: &'static Message,
) -> Result<(), VerboseError> {
    let r: syscalls::MGateRegion = get_request(msg)?;
    sysc_log!(act, "mgate_region(mgate={})", r.mgate);

    let mgate = get_kobj!(k, act, r.mgate, MGate);

    let mut kreply = MsgBuf::new();
    build_vmsg!(kreply, Code::Success, syscalls::MGateRegionReply {
        tile: mgate.tile_id(),
        addr: mgate.addr(),
        size: mgate.size(),
    });
    send_reply(msg, &kreply);
    Ok(())
}

pub fn rgate_buffer(
    k: &mut Kernel,
    act: ActId,
    msg: &'static Message,
) -> Result<(), VerboseError> {
    let r: syscalls::RGateBuffer = get_request(msg)?;
    sysc_log!(act, "rgate_buffer(rgate={})", r.rgate);

    let rgate = get_kobj!(k, act, r.rgate, RGate);
    if !rgate.activated() {
        sysc_err!(Code::InvArgs, "Receive gate is not activated");
    }

    let mut kreply = MsgBuf::new();
    build_vmsg!(kreply, Code::Success, syscalls::RGateBufferReply {
        order: rgate.order(),
        msg_order: rgate.msg_order(),
    });
    send_reply(msg, &kreply);
    Ok(())
}

pub fn kmem_quota(k: &mut Kernel, act: ActId, msg: &'static Message) -> Result<(), VerboseError> {
    let r: syscalls::KMemQuota = get_request(msg)?;
    sysc_log!(act, "kmem_quota(kmem={})", r.kmem);

    let kmem = get_kobj!(k, act, r.kmem, KMem);

    let mut kreply = MsgBuf::new();
    build_vmsg!(kreply, Code::Success, syscalls::KMemQuotaReply {
        id: kmem.id(),
        total: kmem.quota(),
        left: kmem.left(),
    });
    send_reply(msg, &kreply);
    Ok(())
}

pub fn tile_quota(k: &mut Kernel, act: ActId, msg: &'static Message) -> Result<(), VerboseError> {
    let r: syscalls::TileQuota = get_request(msg)?;
    sysc_log!(act, "tile_quota(tile={})", r.tile);

    let tile = get_kobj!(k, act, r.tile, Tile);
    let quota = tile.ep_quota();

    let mut kreply = MsgBuf::new();
    build_vmsg!(kreply, Code::Success, syscalls::TileQuotaReply {
        eps_id: quota.id(),
        eps_total: quota.total(),
        eps_left: quota.left(),
    });
    send_reply(msg, &kreply);
    Ok(())
}

pub fn sem_ctrl(k: &mut Kernel, act: ActId, msg: &'static Message) -> Result<(), VerboseError> {
    let r: syscalls::SemCtrl = get_request(msg)?;
    sysc_log!(act, "sem_ctrl(sem={}, op={:?})", r.sem, r.op);

    let sem = get_kobj!(k, act, r.sem, Sem);
    match r.op {
        syscalls::SemOp::Up => {
            // wake up the first waiter that is still there
            while let Some(waiter) = sem.up() {
                let wmsg = k.acts.get_mut(&waiter).and_then(|a| a.take_sem_wait());
                if let Some(wmsg) = wmsg {
                    reply_success(wmsg);
                    break;
                }
            }
            reply_success(msg);
        },

        syscalls::SemOp::Down => {
            if sem.down(act) {
                reply_success(msg);
            }
            else {
                k.act_mut(act)?.set_sem_wait(msg);
            }
        },
    }
    Ok(())
}

pub fn noop(_k: &mut Kernel, act: ActId, msg: &'static Message) -> Result<(), VerboseError> {
    sysc_log!(act, "noop()");
    reply_success(msg);
    Ok(())
}
