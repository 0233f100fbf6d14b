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

use base::cfg;
use base::col::Vec;
use base::env::{EnvData, Platform};
use base::errors::Error;
use base::io::LogFlags;
use base::kif::{CapSel, INVALID_SEL};
use base::log;
use base::mem::{size_of, GlobOff};
use base::util::{self, math};

use crate::ktcu;
use crate::tiles::Activity;

/// The functions the root activity is started with
#[derive(Copy, Clone)]
pub struct RootEntry {
    /// The entry of the runtime, which initializes the activity and calls the lambda
    pub entry: usize,
    /// The function the root activity executes
    pub lambda: usize,
}

/// Writes the environment of the root activity into its tile's memory
///
/// The arguments are placed behind the [`EnvData`]: the null-terminated argument array followed
/// by the strings.
pub fn load_root(
    act: &Activity,
    root: RootEntry,
    rmng_sel: CapSel,
    first_sel: CapSel,
) -> Result<(), Error> {
    let args_addr = math::round_up(cfg::ENV_START + size_of::<EnvData>(), 8);
    // argv[0] points behind the array with two entries
    let arg0 = (args_addr + 2 * 8) as u64;

    let mut args = Vec::new();
    args.extend_from_slice(&arg0.to_le_bytes());
    args.extend_from_slice(&0u64.to_le_bytes());
    args.extend_from_slice(act.name().as_bytes());
    args.push(0);

    let env = EnvData {
        platform: Platform::Loopback.into(),
        tile_id: act.tile_id().raw() as u64,
        tile_desc: act.tile().desc().value(),
        argc: 1,
        argv: args_addr as u64,
        entry: root.entry as u64,
        first_std_ep: act.eps_start(),
        first_sel,
        act_id: act.id() as u32,
        rmng_sel,
        pager_sess: INVALID_SEL,
        pager_sgate: INVALID_SEL,
        lambda: root.lambda as u64,
        ..Default::default()
    };

    log!(
        LogFlags::KernActs,
        "Loading root activity {:?} with args at {:#x}",
        act,
        args_addr
    );
    ktcu::try_write_mem(act.tile_id(), args_addr as GlobOff, &args)?;
    ktcu::try_write_mem(
        act.tile_id(),
        cfg::ENV_START as GlobOff,
        util::object_to_bytes(&env),
    )
}
