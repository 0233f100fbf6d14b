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

//! The resource manager of the kernel
//!
//! Activities talk to the resource manager via a send gate at [`KRES_EP`](ktcu::KRES_EP), whose
//! label is the id of the activity. The root activity gets such a send gate at boot and announces
//! its children via [`AddChild`](resmng::Operation::AddChild), which creates the send gate for the
//! child. The resource manager hands out sessions, memory, tiles, and boot modules.

use base::build_vmsg;
use base::cfg;
use base::errors::{Code, Error, VerboseError};
use base::io::LogFlags;
use base::kif::{resmng, service, CapRngDesc, CapSel, CapType, Perm};
use base::log;
use base::mem::{GlobOff, MsgBuf};
use base::rc::Rc;
use base::serialize::{Deserialize, M3Deserializer};
use base::tcu::{ActId, Label, Message};
use base::util::math;

use crate::cap::{CapRef, KObject, MGateObject, SGateObject};
use crate::com::{self, PendingOp, Service};
use crate::ktcu;
use crate::state::{reply_code, Kernel};

macro_rules! res_err {
    ($e:expr, $fmt:tt, $($args:tt)*) => ({
        return Err(VerboseError::new($e, base::format!($fmt, $($args)*)));
    });
}

fn get_request<R: Deserialize<'static>>(msg: &'static Message) -> Result<R, Error> {
    let mut de = M3Deserializer::new(msg.as_words());
    de.skip(1);
    de.pop()
}

fn check_unused(k: &Kernel, act: ActId, sel: CapSel) -> Result<(), VerboseError> {
    if !k.caps.unused(act, sel) {
        res_err!(Code::InvArgs, "Selector {} already in use", sel);
    }
    Ok(())
}

/// Handles the resource-manager request `msg`
pub fn handle(k: &mut Kernel, msg: &'static Message) {
    let act = msg.header.label() as ActId;
    if !k.acts.contains_key(&act) {
        ktcu::ack_msg(ktcu::KRES_EP, msg);
        return;
    }

    let opcode = msg.as_words().first().copied().unwrap_or(u64::MAX);
    let op = match resmng::Operation::try_from(opcode) {
        Ok(op) => op,
        Err(_) => {
            reply_code(ktcu::KRES_EP, msg, Code::InvArgs);
            return;
        },
    };

    let res = match op {
        resmng::Operation::AddChild => add_child(k, act, msg),
        resmng::Operation::RemChild => rem_child(k, act, msg),
        resmng::Operation::OpenSess => open_sess(k, act, msg),
        resmng::Operation::CloseSess => close_sess(k, act, msg),
        resmng::Operation::AllocMem => alloc_mem(k, act, msg),
        resmng::Operation::FreeMem => free_mem(k, act, msg),
        resmng::Operation::AllocTile => alloc_tile(k, act, msg),
        resmng::Operation::FreeTile => free_tile(k, act, msg),
        resmng::Operation::UseMod => use_mod(k, act, msg),
    };

    if let Err(e) = res {
        log!(
            LogFlags::Error,
            "\x1B[37;41m{}: resmng::{:?} failed: {} ({:?})\x1B[0m",
            act,
            op,
            e.msg(),
            e.code()
        );
        reply_code(ktcu::KRES_EP, msg, e.code());
    }
}

fn add_child(k: &mut Kernel, act: ActId, msg: &'static Message) -> Result<(), VerboseError> {
    let r: resmng::AddChild<'static> = get_request(msg)?;
    log!(
        LogFlags::ResMngChild,
        "{}: add_child(id={}, sel={}, sgate={}, name={})",
        act,
        r.id,
        r.sel,
        r.sgate,
        r.name
    );

    let child = match k.kobj(act, r.sel) {
        Some(KObject::Activity(id)) if id != act => id,
        _ => res_err!(Code::InvArgs, "Capability {} is no child activity", r.sel),
    };
    if k.rmng_children.contains_key(&child) {
        res_err!(Code::Exists, "Child {} does already exist", child);
    }
    check_unused(k, act, r.sgate)?;

    let sgate = SGateObject::new(&k.rmng_rgate, child as Label, 1);
    k.insert_cap(act, r.sgate, KObject::SGate(sgate))?;
    k.rmng_children.insert(child, act);

    reply_code(ktcu::KRES_EP, msg, Code::Success);
    Ok(())
}

fn rem_child(k: &mut Kernel, act: ActId, msg: &'static Message) -> Result<(), VerboseError> {
    let r: resmng::RemChild = get_request(msg)?;
    log!(LogFlags::ResMngChild, "{}: rem_child(sel={})", act, r.sel);

    let child = match k.kobj(act, r.sel) {
        Some(KObject::Activity(id)) => id,
        _ => res_err!(Code::InvArgs, "Capability {} is no activity", r.sel),
    };
    match k.rmng_children.get(&child) {
        Some(parent) if *parent == act => {
            k.rmng_children.remove(&child);
        },
        _ => res_err!(Code::InvArgs, "Activity {} is no child of {}", child, act),
    }

    reply_code(ktcu::KRES_EP, msg, Code::Success);
    Ok(())
}

fn open_sess(k: &mut Kernel, act: ActId, msg: &'static Message) -> Result<(), VerboseError> {
    let r: resmng::OpenSess<'static> = get_request(msg)?;
    log!(
        LogFlags::ResMngChild,
        "{}: open_sess(dst={}, name={}, arg={})",
        act,
        r.dst,
        r.name,
        r.arg
    );

    check_unused(k, act, r.dst)?;
    let srv = match k.services.get(r.name) {
        Some(s) => s.clone(),
        None => res_err!(Code::NotFound, "Unknown service '{}'", r.name),
    };

    let mut smsg = MsgBuf::new();
    build_vmsg!(smsg, service::Request::Open { arg: r.arg });
    com::send_request(k, smsg, PendingOp::Open {
        srv,
        act,
        dst: r.dst,
        msg,
    })?;
    Ok(())
}

/// Finishes the session creation that `act` requested from `srv`
pub fn finish_open_sess(
    k: &mut Kernel,
    srv: &Rc<Service>,
    act: ActId,
    dst: CapSel,
    msg: &'static Message,
    reply: Result<&'static Message, Error>,
) {
    if !k.acts.contains_key(&act) {
        ktcu::ack_msg(ktcu::KRES_EP, msg);
        return;
    }

    let res = reply.and_then(|rmsg| {
        let mut de = M3Deserializer::new(rmsg.as_words());
        let reply: service::OpenReply = de.pop()?;
        Result::<(), Error>::from(reply.res)?;
        log!(
            LogFlags::ResMngChild,
            "{}: opened session {} at {} (ident={:#x})",
            act,
            reply.sid,
            srv.name(),
            reply.ident
        );
        k.clone_cap(CapRef::new(act, dst), CapRef::new(srv.owner(), reply.sid))
    });

    let code = match res {
        Ok(_) => Code::Success,
        Err(e) => {
            log!(
                LogFlags::Error,
                "{}: opening session at {} failed: {:?}",
                act,
                srv.name(),
                e.code()
            );
            e.code()
        },
    };
    reply_code(ktcu::KRES_EP, msg, code);
}

fn revoke_own(
    k: &mut Kernel,
    act: ActId,
    msg: &'static Message,
    sel: CapSel,
    matches: fn(&KObject) -> bool,
) -> Result<(), VerboseError> {
    match k.kobj(act, sel) {
        Some(ref o) if matches(o) => {},
        _ => res_err!(Code::InvArgs, "Capability {} has the wrong type", sel),
    }
    k.revoke(act, CapRngDesc::new(CapType::Object, sel, 1), true)?;
    reply_code(ktcu::KRES_EP, msg, Code::Success);
    Ok(())
}

fn close_sess(k: &mut Kernel, act: ActId, msg: &'static Message) -> Result<(), VerboseError> {
    let r: resmng::CloseSess = get_request(msg)?;
    log!(LogFlags::ResMngChild, "{}: close_sess(sel={})", act, r.sel);
    // the session is revoked together with the service if the server exited first
    if k.kobj(act, r.sel).is_none() {
        log!(LogFlags::ResMngChild, "{}: session {} is already closed", act, r.sel);
        reply_code(ktcu::KRES_EP, msg, Code::Success);
        return Ok(());
    }
    revoke_own(k, act, msg, r.sel, |o| matches!(o, KObject::Sess(_)))
}

fn alloc_mem(k: &mut Kernel, act: ActId, msg: &'static Message) -> Result<(), VerboseError> {
    let r: resmng::AllocMem = get_request(msg)?;
    log!(
        LogFlags::ResMngMem,
        "{}: alloc_mem(dst={}, size={:#x}, perms={:?})",
        act,
        r.dst,
        r.size,
        r.perms
    );

    check_unused(k, act, r.dst)?;
    if r.size == 0 {
        res_err!(Code::InvArgs, "Invalid size {:#x}", r.size);
    }

    let page = cfg::PAGE_SIZE as GlobOff;
    let alloc = k.mem.allocate(math::round_up(r.size, page), page)?;
    log!(LogFlags::ResMngMem, "{}: allocated {:?}", act, alloc);
    let mgate = MGateObject::new_owned(alloc, r.perms);
    k.insert_cap(act, r.dst, KObject::MGate(mgate))?;

    reply_code(ktcu::KRES_EP, msg, Code::Success);
    Ok(())
}

fn free_mem(k: &mut Kernel, act: ActId, msg: &'static Message) -> Result<(), VerboseError> {
    let r: resmng::FreeMem = get_request(msg)?;
    log!(LogFlags::ResMngMem, "{}: free_mem(sel={})", act, r.sel);
    revoke_own(k, act, msg, r.sel, |o| {
        matches!(o, KObject::MGate(m) if m.allocation().is_some())
    })
}

fn alloc_tile(k: &mut Kernel, act: ActId, msg: &'static Message) -> Result<(), VerboseError> {
    let r: resmng::AllocTile = get_request(msg)?;
    log!(
        LogFlags::ResMngTiles,
        "{}: alloc_tile(dst={}, desc={:?})",
        act,
        r.dst,
        r.desc
    );

    check_unused(k, act, r.dst)?;
    let tile = match k.tiles.find_free(r.desc) {
        Some(t) => t,
        None => res_err!(Code::NoFreeTile, "No free tile for {:?}", r.desc),
    };
    let obj = match k.tiles.tile_obj(tile) {
        Some(o) => o.clone(),
        None => res_err!(Code::NoFreeTile, "Tile {} can't be used", tile),
    };

    k.tiles.set_allocated(tile, true);
    if let Err(e) = k.insert_cap(act, r.dst, KObject::Tile(obj.clone())) {
        k.tiles.set_allocated(tile, false);
        return Err(e.into());
    }
    log!(LogFlags::ResMngTiles, "{}: allocated tile {}", act, tile);

    let mut reply = MsgBuf::new();
    build_vmsg!(reply, Code::Success, resmng::AllocTileReply {
        id: tile,
        desc: obj.desc(),
    });
    ktcu::reply(ktcu::KRES_EP, &reply, msg).ok();
    Ok(())
}

fn free_tile(k: &mut Kernel, act: ActId, msg: &'static Message) -> Result<(), VerboseError> {
    let r: resmng::FreeTile = get_request(msg)?;
    log!(LogFlags::ResMngTiles, "{}: free_tile(sel={})", act, r.sel);
    revoke_own(k, act, msg, r.sel, |o| matches!(o, KObject::Tile(_)))
}

fn use_mod(k: &mut Kernel, act: ActId, msg: &'static Message) -> Result<(), VerboseError> {
    let r: resmng::UseMod<'static> = get_request(msg)?;
    log!(
        LogFlags::ResMngMem,
        "{}: use_mod(dst={}, name={})",
        act,
        r.dst,
        r.name
    );

    check_unused(k, act, r.dst)?;
    let (tile, addr, size) = match k.mods.iter().find(|m| m.name() == r.name) {
        Some(m) => (m.tile(), m.addr(), m.size()),
        None => res_err!(Code::NotFound, "Unknown boot module '{}'", r.name),
    };

    let mgate = MGateObject::new(tile, addr, size, Perm::R);
    k.insert_cap(act, r.dst, KObject::MGate(mgate))?;

    let mut reply = MsgBuf::new();
    build_vmsg!(reply, Code::Success, resmng::UseModReply { size });
    ktcu::reply(ktcu::KRES_EP, &reply, msg).ok();
    Ok(())
}
