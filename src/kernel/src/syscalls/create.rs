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
use base::errors::{Code, VerboseError};
use base::kif::{self, syscalls, CapRngDesc, CapType};
use base::mem::{GlobOff, MsgBuf};
use base::tcu::{ActId, Message};

use crate::cap::{CapRef, EPObject, KObject, MGateObject, RGateObject, SGateObject};
use crate::cap::{SemObject, ServObject, SessObject};
use crate::com::Service;
use crate::state::Kernel;
use crate::syscalls::{get_request, reply_success, send_reply};
use crate::tiles::{self, ActFlags};

pub fn create_mgate(
    k: &mut Kernel,
    act: ActId,
    msg: &'static Message,
) -> Result<(), VerboseError> {
    let r: syscalls::CreateMGate = get_request(msg)?;
    sysc_log!(
        act,
        "create_mgate(dst={}, act={}, addr={:#x}, size={:#x}, perms={:?})",
        r.dst,
        r.act,
        r.addr,
        r.size,
        r.perms
    );

    check_unused!(k, act, r.dst);
    let target = get_kobj!(k, act, r.act, Activity);
    let tile = k.act(target)?.tile_id();

    let start = cfg::ENV_START as GlobOff;
    let end = start + cfg::ACT_REGION_SIZE as GlobOff;
    let valid = match r.addr.checked_add(r.size) {
        Some(last) => r.size > 0 && r.addr >= start && last <= end,
        None => false,
    };
    if !valid {
        sysc_err!(
            Code::InvArgs,
            "Region {:#x}..{:#x} is outside of the activity's memory",
            r.addr,
            r.addr.wrapping_add(r.size)
        );
    }

    let mgate = MGateObject::new(tile, r.addr, r.size, r.perms);
    k.insert_child_cap(act, r.dst, KObject::MGate(mgate), CapRef::new(act, r.act))?;

    reply_success(msg);
    Ok(())
}

pub fn create_rgate(
    k: &mut Kernel,
    act: ActId,
    msg: &'static Message,
) -> Result<(), VerboseError> {
    let r: syscalls::CreateRGate = get_request(msg)?;
    sysc_log!(
        act,
        "create_rgate(dst={}, size={:#x}, msg_size={:#x})",
        r.dst,
        1u64 << r.order.min(63),
        1u64 << r.msg_order.min(63)
    );

    check_unused!(k, act, r.dst);
    if r.msg_order < 4 || r.msg_order > r.order || r.order > 16 {
        sysc_err!(
            Code::InvArgs,
            "Invalid orders (order={}, msg_order={})",
            r.order,
            r.msg_order
        );
    }
    if (1 << (r.order - r.msg_order)) > cfg::MAX_RB_SLOTS {
        sysc_err!(Code::InvArgs, "Too many slots");
    }

    let rgate = RGateObject::new(r.order, r.msg_order);
    k.insert_cap(act, r.dst, KObject::RGate(rgate))?;

    reply_success(msg);
    Ok(())
}

pub fn create_sgate(
    k: &mut Kernel,
    act: ActId,
    msg: &'static Message,
) -> Result<(), VerboseError> {
    let r: syscalls::CreateSGate = get_request(msg)?;
    sysc_log!(
        act,
        "create_sgate(dst={}, rgate={}, label={:#x}, credits={})",
        r.dst,
        r.rgate,
        r.label,
        r.credits
    );

    check_unused!(k, act, r.dst);
    let rgate = get_kobj!(k, act, r.rgate, RGate);
    if r.credits == 0 || r.credits > kif::UNLIM_CREDITS {
        sysc_err!(Code::InvArgs, "Invalid number of credits ({})", r.credits);
    }

    let sgate = SGateObject::new(&rgate, r.label, r.credits);
    k.insert_child_cap(act, r.dst, KObject::SGate(sgate), CapRef::new(act, r.rgate))?;

    reply_success(msg);
    Ok(())
}

pub fn create_srv(
    k: &mut Kernel,
    act: ActId,
    msg: &'static Message,
) -> Result<(), VerboseError> {
    let r: syscalls::CreateSrv<'static> = get_request(msg)?;
    sysc_log!(
        act,
        "create_srv(dst={}, rgate={}, name={})",
        r.dst,
        r.rgate,
        r.name
    );

    check_unused!(k, act, r.dst);
    let rgate = get_kobj!(k, act, r.rgate, RGate);
    if r.name.is_empty() || r.name.len() > syscalls::MAX_NAME_LEN {
        sysc_err!(Code::InvArgs, "Invalid server name '{}'", r.name);
    }
    if k.services.contains_key(r.name) {
        sysc_err!(Code::Exists, "Service '{}' does already exist", r.name);
    }

    let id = k.alloc_srv_id();
    let srv = Service::new(id, r.name, act, rgate);
    let obj = KObject::Serv(ServObject::new(srv.clone()));
    k.insert_child_cap(act, r.dst, obj, CapRef::new(act, r.rgate))?;
    k.services.insert(srv.name().into(), srv);

    reply_success(msg);
    Ok(())
}

pub fn create_sess(
    k: &mut Kernel,
    act: ActId,
    msg: &'static Message,
) -> Result<(), VerboseError> {
    let r: syscalls::CreateSess = get_request(msg)?;
    sysc_log!(
        act,
        "create_sess(dst={}, srv={}, ident={:#x})",
        r.dst,
        r.srv,
        r.ident
    );

    check_unused!(k, act, r.dst);
    let serv = get_kobj!(k, act, r.srv, Serv);
    if serv.service().owner() != act {
        sysc_err!(Code::NoPerm, "Only the owner of a service can create sessions");
    }

    let sess = SessObject::new(serv.service(), r.ident);
    k.insert_child_cap(act, r.dst, KObject::Sess(sess), CapRef::new(act, r.srv))?;

    reply_success(msg);
    Ok(())
}

pub fn create_activity(
    k: &mut Kernel,
    act: ActId,
    msg: &'static Message,
) -> Result<(), VerboseError> {
    let r: syscalls::CreateActivity<'static> = get_request(msg)?;
    sysc_log!(
        act,
        "create_activity(dst={}, name={}, tile={}, kmem={})",
        r.dst,
        r.name,
        r.tile,
        r.kmem
    );

    check_unused!(k, act, r.dst);
    if r.name.is_empty() || r.name.len() > syscalls::MAX_NAME_LEN {
        sysc_err!(Code::InvArgs, "Invalid activity name '{}'", r.name);
    }
    let tile = get_kobj!(k, act, r.tile, Tile);
    let kmem = get_kobj!(k, act, r.kmem, KMem);

    let id = tiles::create_activity(k, r.name, ActFlags::empty(), tile, kmem)?;

    // the capability at the parent owns the activity; revoking it removes the activity
    if let Err(e) = k.insert_cap(act, r.dst, KObject::Activity(id)) {
        tiles::remove_activity(k, id);
        return Err(e.into());
    }

    for (dst, src) in [
        (kif::SEL_TILE, r.tile),
        (kif::SEL_KMEM, r.kmem),
        (kif::SEL_ACT, r.dst),
    ] {
        if let Err(e) = k.clone_cap(CapRef::new(id, dst), CapRef::new(act, src)) {
            k.revoke(act, CapRngDesc::new(CapType::Object, r.dst, 1), true)
                .ok();
            return Err(e.into());
        }
    }

    let eps_start = k.act(id)?.eps_start();
    let mut kreply = MsgBuf::new();
    build_vmsg!(kreply, Code::Success, syscalls::CreateActivityReply {
        id,
        eps_start
    });
    send_reply(msg, &kreply);
    Ok(())
}

pub fn create_sem(
    k: &mut Kernel,
    act: ActId,
    msg: &'static Message,
) -> Result<(), VerboseError> {
    let r: syscalls::CreateSem = get_request(msg)?;
    sysc_log!(act, "create_sem(dst={}, value={})", r.dst, r.value);

    check_unused!(k, act, r.dst);
    k.insert_cap(act, r.dst, KObject::Sem(SemObject::new(r.value)))?;

    reply_success(msg);
    Ok(())
}

pub fn create_map(
    _k: &mut Kernel,
    act: ActId,
    msg: &'static Message,
) -> Result<(), VerboseError> {
    let r: syscalls::CreateMap = get_request(msg)?;
    sysc_log!(
        act,
        "create_map(dst={}, act={}, mgate={}, first={}, pages={}, perms={:?})",
        r.dst,
        r.act,
        r.mgate,
        r.first,
        r.pages,
        r.perms
    );

    sysc_err!(Code::NotSup, "Mappings are not supported");
}

pub fn alloc_eps(
    k: &mut Kernel,
    act: ActId,
    msg: &'static Message,
) -> Result<(), VerboseError> {
    let r: syscalls::AllocEP = get_request(msg)?;
    sysc_log!(
        act,
        "alloc_ep(dst={}, act={}, epid={:?}, replies={})",
        r.dst,
        r.act,
        r.epid,
        r.replies
    );

    check_unused!(k, act, r.dst);
    let target = get_kobj!(k, act, r.act, Activity);
    if r.replies as usize > cfg::MAX_RB_SLOTS {
        sysc_err!(Code::InvArgs, "Too many reply EPs ({})", r.replies);
    }

    let count = 1 + r.replies;
    let (tile, tile_obj) = {
        let tact = k.act(target)?;
        (tact.tile_id(), tact.tile().clone())
    };
    if !tile_obj.has_quota(count) {
        sysc_err!(
            Code::NoSpace,
            "Insufficient EPs ({} of {} left, need {})",
            tile_obj.ep_quota().left(),
            tile_obj.ep_quota().total(),
            count
        );
    }

    let ep = match r.epid {
        Some(ep) => {
            if !k.tiles.alloc_eps_at(tile, ep, count) {
                sysc_err!(Code::Exists, "EPs {}..{} are not free", ep, ep as u32 + count);
            }
            ep
        },
        None => match k.tiles.alloc_eps(tile, count) {
            Some(ep) => ep,
            None => sysc_err!(Code::NoSpace, "No {} contiguous EPs left", count),
        },
    };

    let epobj = EPObject::new(target, tile, ep, r.replies, &tile_obj);
    if let Err(e) = k.insert_child_cap(act, r.dst, KObject::EP(epobj), CapRef::new(act, r.act)) {
        k.tiles.free_eps(tile, ep, count);
        return Err(e.into());
    }
    tile_obj.alloc(count);

    let mut kreply = MsgBuf::new();
    build_vmsg!(kreply, Code::Success, syscalls::AllocEPReply { ep });
    send_reply(msg, &kreply);
    Ok(())
}
