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

use base::errors::{Code, VerboseError};
use base::kif::syscalls;
use base::tcu::{ActId, Message};

use crate::cap::{CapRef, KObject, MGateObject};
use crate::state::Kernel;
use crate::syscalls::{get_request, reply_success};

pub fn derive_mem(k: &mut Kernel, act: ActId, msg: &'static Message) -> Result<(), VerboseError> {
    let r: syscalls::DeriveMem = get_request(msg)?;
    sysc_log!(
        act,
        "derive_mem(act={}, src={}, dst={}, size={:#x}, offset={:#x}, perms={:?})",
        r.act,
        r.src,
        r.dst,
        r.size,
        r.offset,
        r.perms
    );

    let target = get_kobj!(k, act, r.act, Activity);
    check_unused!(k, target, r.dst);
    let mgate = get_kobj!(k, act, r.src, MGate);

    let in_range = match r.offset.checked_add(r.size) {
        Some(end) => r.size > 0 && end <= mgate.size(),
        None => false,
    };
    if !in_range {
        sysc_err!(
            Code::InvArgs,
            "Region {:#x}+{:#x} is not within the memory gate of size {:#x}",
            r.offset,
            r.size,
            mgate.size()
        );
    }
    if !mgate.perms().contains(r.perms) {
        sysc_err!(
            Code::NoPerm,
            "Cannot derive {:?} from {:?}",
            r.perms,
            mgate.perms()
        );
    }

    let derived = MGateObject::new(mgate.tile_id(), mgate.addr() + r.offset, r.size, r.perms);
    k.insert_child_cap(target, r.dst, KObject::MGate(derived), CapRef::new(act, r.src))?;

    reply_success(msg);
    Ok(())
}

pub fn derive_kmem(k: &mut Kernel, act: ActId, msg: &'static Message) -> Result<(), VerboseError> {
    let r: syscalls::DeriveKMem = get_request(msg)?;
    sysc_log!(
        act,
        "derive_kmem(kmem={}, dst={}, quota={:#x})",
        r.kmem,
        r.dst,
        r.quota
    );

    check_unused!(k, act, r.dst);
    let kmem = get_kobj!(k, act, r.kmem, KMem);

    let id = k.alloc_quota_id();
    let child = match kmem.derive(id, r.quota) {
        Some(c) => c,
        None => sysc_err!(
            Code::NoKernMem,
            "Insufficient quota ({:#x} left, need {:#x})",
            kmem.left(),
            r.quota
        ),
    };

    if let Err(e) = k.insert_child_cap(
        act,
        r.dst,
        KObject::KMem(child.clone()),
        CapRef::new(act, r.kmem),
    ) {
        child.revoke();
        return Err(e.into());
    }

    reply_success(msg);
    Ok(())
}

pub fn derive_tile(k: &mut Kernel, act: ActId, msg: &'static Message) -> Result<(), VerboseError> {
    let r: syscalls::DeriveTile = get_request(msg)?;
    sysc_log!(
        act,
        "derive_tile(tile={}, dst={}, eps={:?})",
        r.tile,
        r.dst,
        r.eps
    );

    check_unused!(k, act, r.dst);
    let tile = get_kobj!(k, act, r.tile, Tile);

    let id = k.alloc_quota_id();
    let child = match tile.derive(id, r.eps) {
        Some(c) => c,
        None => sysc_err!(
            Code::NoSpace,
            "Insufficient EPs ({} left, need {:?})",
            tile.ep_quota().left(),
            r.eps
        ),
    };

    if let Err(e) = k.insert_child_cap(
        act,
        r.dst,
        KObject::Tile(child.clone()),
        CapRef::new(act, r.tile),
    ) {
        child.revoke();
        return Err(e.into());
    }

    reply_success(msg);
    Ok(())
}
