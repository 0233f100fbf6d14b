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
use base::errors::{Code, Error};
use base::io::LogFlags;
use base::kif::{self, syscalls, upcalls, CapSel, TileDesc, TileISA, TileType};
use base::log;
use base::mem::{GlobOff, MsgBuf};
use base::quota;
use base::rc::Rc;
use base::tcu::{
    self, ActId, EpId, Label, Message, TileId, NO_REPLIES, STD_EPS_COUNT, TCU,
};

use crate::cap::{KMemObject, KObject, SGateObject, TileObject};
use crate::ktcu;
use crate::platform::KERNEL_TILE;
use crate::state::Kernel;
use crate::tiles::{loader, ActFlags, Activity, ExitWait, RootEntry, State};

/// Creates a new activity on the tile of `tile`, using the kernel memory `kmem`
///
/// The standard endpoints of the activity are allocated and configured. The activity does not
/// have capabilities yet.
pub fn create_activity(
    k: &mut Kernel,
    name: &str,
    flags: ActFlags,
    tile: Rc<TileObject>,
    kmem: Rc<KMemObject>,
) -> Result<ActId, Error> {
    let tile_id = tile.tile();
    if !tile.desc().supports_activities() {
        return Err(Error::new(Code::InvArgs));
    }
    if let Some(user) = k.tiles.user(tile_id) {
        log!(LogFlags::KernActs, "Tile {} is still used by activity {}", tile_id, user);
        return Err(Error::new(Code::NoFreeTile));
    }

    let count = STD_EPS_COUNT as u32;
    if !tile.has_quota(count) {
        return Err(Error::new(Code::NoSpace));
    }
    let eps_start = k
        .tiles
        .alloc_eps(tile_id, count)
        .ok_or_else(|| Error::new(Code::NoSpace))?;

    let id = k.alloc_act_id();
    if let Err(e) = config_std_eps(k, id, tile_id, eps_start) {
        k.tiles.free_eps(tile_id, eps_start, count);
        return Err(e);
    }
    tile.alloc(count);

    let act = Activity::new(id, name, flags, tile, kmem, eps_start);
    log!(LogFlags::KernActs, "Created {:?}", act);
    k.caps.add_table(id);
    k.acts.insert(id, act);
    k.tiles.set_user(tile_id, Some(id));
    Ok(id)
}

fn config_std_eps(k: &Kernel, id: ActId, tile: TileId, eps_start: EpId) -> Result<(), Error> {
    let m = &k.machine;
    ktcu::config_remote_ep(m, tile, eps_start + tcu::SYSC_SEP_OFF, |regs| {
        *regs = TCU::config_send(
            id,
            id as Label,
            KERNEL_TILE,
            ktcu::KSYS_EP,
            cfg::SYSC_RBUF_ORD,
            1,
        );
    })?;

    let mut addr = cfg::RBUF_STD_ADDR as GlobOff;
    ktcu::config_remote_ep(m, tile, eps_start + tcu::SYSC_REP_OFF, |regs| {
        *regs = TCU::config_recv(id, addr, cfg::SYSC_RBUF_ORD, cfg::SYSC_RBUF_ORD, None);
    })?;
    addr += cfg::SYSC_RBUF_SIZE as GlobOff;

    ktcu::config_remote_ep(m, tile, eps_start + tcu::UPCALL_REP_OFF, |regs| {
        *regs = TCU::config_recv(
            id,
            addr,
            cfg::UPCALL_RBUF_ORD,
            cfg::UPCALL_RBUF_MSG_ORD,
            None,
        );
    })?;
    addr += cfg::UPCALL_RBUF_SIZE as GlobOff;

    ktcu::config_remote_ep(m, tile, eps_start + tcu::DEF_REP_OFF, |regs| {
        *regs = TCU::config_recv(id, addr, cfg::DEF_RBUF_ORD, cfg::DEF_RBUF_MSG_ORD, None);
    })
}

/// Creates and starts the root activity with `kmem` bytes of kernel memory
pub fn create_root(k: &mut Kernel, root: RootEntry, kmem: usize) -> Result<ActId, Error> {
    let tile = k
        .tiles
        .find_free(TileDesc::new(TileType::Comp, TileISA::None, 0))
        .ok_or_else(|| Error::new(Code::NoFreeTile))?;
    let tile_obj = k
        .tiles
        .tile_obj(tile)
        .cloned()
        .ok_or_else(|| Error::new(Code::NoFreeTile))?;
    k.tiles.set_allocated(tile, true);

    let kmem = KMemObject::new(quota::DEF_QUOTA_ID, kmem);
    let id = create_activity(k, "root", ActFlags::IS_ROOT, tile_obj.clone(), kmem.clone())?;

    k.insert_cap(id, kif::SEL_TILE, KObject::Tile(tile_obj))?;
    k.insert_cap(id, kif::SEL_KMEM, KObject::KMem(kmem))?;
    k.insert_cap(id, kif::SEL_ACT, KObject::Activity(id))?;
    let rmng = SGateObject::new(&k.rmng_rgate, id as Label, 1);
    k.insert_cap(id, kif::FIRST_FREE_SEL, KObject::SGate(rmng))?;

    loader::load_root(k.act(id)?, root, kif::FIRST_FREE_SEL, kif::FIRST_FREE_SEL + 1)?;
    start_activity(k, id)?;
    Ok(id)
}

pub fn start_activity(k: &mut Kernel, id: ActId) -> Result<(), Error> {
    let act = k.act(id)?;
    if act.state() != State::Init {
        return Err(Error::new(Code::InvArgs));
    }
    log!(LogFlags::KernActs, "Starting {:?}", act);
    k.machine.start_activity(act.tile_id(), act.name())?;
    k.act_mut(id)?.set_running();
    Ok(())
}

/// Stops the activity and lets it exit with `code`
pub fn stop_activity(k: &mut Kernel, id: ActId, code: Code) -> Result<(), Error> {
    let act = k.act(id)?;
    let tile = act.tile_id();
    log!(LogFlags::KernActs, "Stopping {:?} with {:?}", act, code);
    match act.state() {
        State::Dead => return Ok(()),
        // the tile is free again as soon as the exit has been reported
        State::Running => k.machine.stop_activity(tile)?,
        State::Init => k.tiles.set_user(tile, None),
    }
    activity_died(k, id, code);
    Ok(())
}

/// Removes the activity, which revokes all its capabilities and frees its endpoints
pub fn remove_activity(k: &mut Kernel, id: ActId) {
    let (tile, eps_start, state) = match k.acts.get_mut(&id) {
        Some(act) => {
            log!(LogFlags::KernActs, "Removing {:?}", act);
            // the activity will not receive replies anymore
            if let Some(msg) = act.take_wait().and_then(|w| w.msg) {
                ktcu::ack_msg(ktcu::KSYS_EP, msg);
            }
            if let Some(msg) = act.take_sem_wait() {
                ktcu::ack_msg(ktcu::KSYS_EP, msg);
            }
            (act.tile_id(), act.eps_start(), act.state())
        },
        None => return,
    };

    k.activations.retain(|(act, msg)| {
        if *act == id {
            ktcu::ack_msg(ktcu::KSYS_EP, msg);
        }
        *act != id
    });
    ktcu::drop_msgs(ktcu::KSYS_EP, id as Label);
    ktcu::drop_msgs(ktcu::KRES_EP, id as Label);
    k.rmng_children.remove(&id);

    let released = k.caps.revoke_all(id);
    k.release_all(released);
    k.caps.remove_table(id);

    for ep in eps_start..eps_start + STD_EPS_COUNT as EpId {
        ktcu::invalidate_ep_remote(&k.machine, tile, ep, true).ok();
    }
    k.tiles.free_eps(tile, eps_start, STD_EPS_COUNT as u32);

    match state {
        State::Running => {
            k.machine.stop_activity(tile).ok();
        },
        State::Init => k.tiles.set_user(tile, None),
        State::Dead => {},
    }

    if let Some(act) = k.acts.remove(&id) {
        act.tile().free(STD_EPS_COUNT as u32);
    }
}

/// Handles the exit notification for `tile` with the given exit code
pub fn tile_exited(k: &mut Kernel, tile: TileId, code: Code) {
    let user = k.tiles.user(tile);
    k.tiles.set_user(tile, None);
    log!(
        LogFlags::KernActs,
        "Tile {} exited with {:?} (activity {:?})",
        tile,
        code,
        user
    );

    if let Some(id) = user {
        if let Some(act) = k.acts.get(&id) {
            if act.is_root() {
                k.set_root_exit(code);
            }
            activity_died(k, id, code);
        }
    }
}

/// Handles an exit notification on [`KTMUX_EP`](ktcu::KTMUX_EP)
pub fn handle_exit_msg(k: &mut Kernel, msg: &'static Message) {
    let words = msg.as_words();
    if words.len() >= 2 {
        let tile = TileId::new_from_raw(words[0] as u16);
        tile_exited(k, tile, Code::from(words[1] as u32));
    }
    ktcu::ack_msg(ktcu::KTMUX_EP, msg);
}

fn activity_died(k: &mut Kernel, id: ActId, code: Code) {
    let died = k.acts.get_mut(&id).map(|act| act.set_dead(code)).unwrap_or(false);
    if !died {
        return;
    }

    let waiters: Vec<ActId> = k
        .acts
        .iter()
        .filter(|(_, a)| a.wait().is_some())
        .map(|(wid, _)| *wid)
        .collect();
    for waiter in waiters {
        let sel = k.acts.get(&waiter).and_then(|a| a.wait()).and_then(|w| {
            w.sels
                .iter()
                .find(|sel| matches!(k.caps.obj(waiter, **sel), Some(KObject::Activity(a)) if *a == id))
                .copied()
        });
        if let Some(sel) = sel {
            let wait = k.acts.get_mut(&waiter).and_then(|a| a.take_wait());
            if let Some(wait) = wait {
                finish_wait(k, waiter, wait, sel, code);
            }
        }
    }
}

fn finish_wait(k: &Kernel, waiter: ActId, wait: ExitWait, sel: CapSel, code: Code) {
    match wait.msg {
        Some(msg) => {
            log!(
                LogFlags::KernActs,
                "Activity {}: wait finished with {}:{:?}",
                waiter,
                sel,
                code
            );
            let mut rep = MsgBuf::new();
            build_vmsg!(rep, Code::Success, syscalls::ActivityWaitReply {
                act_sel: sel,
                exitcode: code,
            });
            ktcu::reply(ktcu::KSYS_EP, &rep, msg).ok();
        },
        None => {
            let act = match k.acts.get(&waiter) {
                Some(a) => a,
                None => return,
            };
            log!(
                LogFlags::KernUpcalls,
                "Sending upcall ActWait (event={}, {}:{:?}) to {:?}",
                wait.event,
                sel,
                code,
                act
            );
            let mut msg = MsgBuf::new();
            build_vmsg!(msg, upcalls::ActivityWait {
                def: upcalls::DefaultUpcall {
                    opcode: upcalls::Operation::ActWait,
                    event: wait.event,
                },
                error: Code::Success,
                act_sel: sel,
                exitcode: code,
            });
            let rep = act.eps_start() + tcu::UPCALL_REP_OFF;
            if let Err(e) = ktcu::send_to(act.tile_id(), rep, 0, &msg, 0, NO_REPLIES) {
                log!(LogFlags::Error, "Unable to send upcall to {:?}: {:?}", act, e);
            }
        },
    }
}

/// Lets `waiter` wait for the exit of one of the activities in `sels`
///
/// Returns the selector and exit code of an activity that has already exited. Otherwise, the
/// wait is registered: synchronous waits (`event` = 0) are answered by replying to `msg` and
/// asynchronous waits by an upcall.
pub fn wait_activity(
    k: &mut Kernel,
    waiter: ActId,
    sels: &[CapSel],
    event: u64,
    msg: &'static Message,
) -> Result<Option<(CapSel, Code)>, Error> {
    for sel in sels {
        if let Some(KObject::Activity(id)) = k.caps.obj(waiter, *sel) {
            match k.acts.get(id) {
                Some(a) if a.state() == State::Dead => {
                    return Ok(Some((*sel, a.exit_code().unwrap_or(Code::Unspecified))));
                },
                None => return Ok(Some((*sel, Code::ActivityGone))),
                _ => {},
            }
        }
    }

    let wait = ExitWait {
        sels: sels.to_vec(),
        event,
        msg: if event == 0 { Some(msg) } else { None },
    };
    if let Some(old) = k.act_mut(waiter)?.set_wait(wait) {
        log!(
            LogFlags::KernActs,
            "Activity {}: replacing wait for {:?}",
            waiter,
            old.sels
        );
        if let Some(msg) = old.msg {
            ktcu::ack_msg(ktcu::KSYS_EP, msg);
        }
    }
    Ok(None)
}
