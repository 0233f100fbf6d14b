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

use base::errors::Code;
use base::tcu::TCU;

use crate::com;
use crate::ktcu;
use crate::resmng;
use crate::state::Kernel;
use crate::syscalls;
use crate::tiles;

/// Handles all messages that arrived at the kernel's endpoints
///
/// Exit notifications are handled first, so that the exit codes are known before syscalls that
/// wait for them.
pub fn handle_msgs(k: &mut Kernel) {
    while let Some(msg) = ktcu::fetch_msg(ktcu::KTMUX_EP) {
        tiles::handle_exit_msg(k, msg);
    }

    while let Some(msg) = ktcu::fetch_msg(ktcu::KSRV_EP) {
        com::handle_reply(k, msg);
    }

    while let Some(msg) = ktcu::fetch_msg(ktcu::KSYS_EP) {
        syscalls::handle(k, msg);
    }

    while let Some(msg) = ktcu::fetch_msg(ktcu::KRES_EP) {
        resmng::handle(k, msg);
    }
}

/// Runs the kernel until the root activity exited and returns its exit code
pub fn workloop(k: &mut Kernel) -> Code {
    loop {
        TCU::fetch_events();
        handle_msgs(k);

        if let Some(code) = k.root_exit() {
            return code;
        }

        TCU::sleep().ok();
    }
}
