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

//! Register access for the loopback platform
//!
//! Register reads and writes go to the register file of the tile the current thread is bound to.
//! Writing the COMMAND register executes the command immediately, so that the command is complete
//! when the write returns. Threads that are not bound to a tile see a register file of zeros and
//! all of their commands fail with [`Aborted`](Code::Aborted).

use std::io::Write;
use std::panic;
use std::thread;
use std::time::Duration;

use crate::errors::{Code, Error};
use crate::tcu::{
    build_ext_cmd, split_cmd, CmdOpCode, EpId, ExtCmdOpCode, ExtReg, Reg, RegKey, UnprivReg,
};

use super::engine;
use super::machine::{with_binding, Binding, ExitRequest};

pub fn read_reg(key: RegKey) -> Reg {
    match key {
        // reading the time does not need the lock, because the logger uses it while holding it
        RegKey::Unpriv(UnprivReg::CurTime) => with_binding(|b| b.machine.nanotime()),
        _ => with_binding(|b| {
            b.machine
                .lock()
                .tile(b.tile)
                .map(|ts| ts.reg(key))
                .unwrap_or(0)
        }),
    }
    .unwrap_or(match key {
        RegKey::Unpriv(UnprivReg::Command) => CmdOpCode::Idle as Reg | (Code::Aborted as Reg) << 20,
        _ => 0,
    })
}

pub fn write_reg(key: RegKey, val: Reg) {
    let stop = with_binding(|b| match key {
        RegKey::Unpriv(UnprivReg::Command) => exec_cmd(b, val),
        RegKey::Ext(ExtReg::ExtCmd) => {
            exec_ext_cmd(b, val);
            false
        },
        _ => {
            if let Ok(ts) = b.machine.lock().tile_mut(b.tile) {
                ts.set_reg(key, val);
            }
            false
        },
    })
    .unwrap_or(false);

    // leave the activity if it has been stopped while waiting. during unwinding, we just let the
    // command fail.
    if stop && !thread::panicking() {
        panic::resume_unwind(Box::new(ExitRequest(Code::Aborted)));
    }
}

fn exec_cmd(b: &Binding, cmd: Reg) -> bool {
    let (op, ep, _, arg) = split_cmd(cmd);
    let mut state = b.machine.lock();
    let (arg1, data_addr, data_size) = match state.tile_mut(b.tile) {
        Ok(ts) => {
            ts.commands += 1;
            (
                ts.reg(RegKey::Unpriv(UnprivReg::Arg1)),
                ts.reg(RegKey::Unpriv(UnprivReg::DataAddr)) as usize,
                ts.reg(RegKey::Unpriv(UnprivReg::DataSize)) as usize,
            )
        },
        Err(_) => return false,
    };

    let mut stop = false;
    let res = match op {
        CmdOpCode::Sleep => {
            let ep = arg as EpId;
            let timeout = if arg1 == Reg::MAX {
                None
            }
            else {
                Some(Duration::from_nanos(arg1))
            };
            let tile = b.tile;
            let (st, stopped) = b.machine.wait_until(state, tile, timeout, |st| {
                st.tile(tile).map(|ts| !ts.events.is_empty()).unwrap_or(true)
                    || engine::has_unread(st, tile, ep)
            });
            state = st;
            stop = stopped;
            if stopped {
                Err(Error::new(Code::Aborted))
            }
            else {
                Ok(false)
            }
        },
        CmdOpCode::Print => {
            // safety: the runtime passes a valid string
            print(unsafe { core::slice::from_raw_parts(data_addr as *const u8, data_size) });
            Ok(false)
        },
        _ => engine::execute(&b.machine, &mut state, b.tile, op, ep, arg),
    };

    let (notify, err) = match res {
        Ok(n) => (n, Code::Success),
        Err(e) => (false, e.code()),
    };
    if let Ok(ts) = state.tile_mut(b.tile) {
        ts.set_reg(
            RegKey::Unpriv(UnprivReg::Command),
            CmdOpCode::Idle as Reg | (err as Reg) << 20,
        );
    }
    drop(state);

    if notify {
        b.machine.notify();
    }
    stop
}

fn exec_ext_cmd(b: &Binding, cmd: Reg) {
    let op = ExtCmdOpCode::try_from(cmd & 0xF).unwrap_or(ExtCmdOpCode::Idle);
    let ep = ((cmd >> 9) & 0xFFFF) as EpId;
    let force = (cmd >> 25) & 1 != 0;

    let mut state = b.machine.lock();
    let res = match op {
        ExtCmdOpCode::Idle => Ok(()),
        ExtCmdOpCode::InvEP => engine::invalidate_ep(&mut state, b.tile, ep, force),
        ExtCmdOpCode::Reset => Err(Error::new(Code::NotSup)),
    };
    let err = Code::from(res);
    if let Ok(ts) = state.tile_mut(b.tile) {
        let idle = build_ext_cmd(0, ExtCmdOpCode::Idle, false);
        ts.set_reg(RegKey::Ext(ExtReg::ExtCmd), idle | (err as Reg) << 4);
    }
    drop(state);
    b.machine.notify();
}

/// Writes the given string to the standard error output of the host
///
/// This does not acquire the machine lock, because the TCU logs while holding it.
pub fn print(s: &[u8]) -> usize {
    let mut stderr = std::io::stderr().lock();
    match stderr.write_all(s) {
        Ok(_) => s.len(),
        // pretend that we wrote everything; there is nobody we could report that to
        Err(_) => s.len(),
    }
}

/// Translates the given virtual address of the current activity into a host address
pub fn local_addr(virt: usize) -> usize {
    with_binding(|b| {
        b.machine
            .mem(b.tile)
            .ok()
            .and_then(|m| m.translate(virt as u64, 0))
    })
    .flatten()
    .unwrap_or(virt)
}

/// Returns the number of commands the current tile has executed
pub fn command_count() -> u64 {
    with_binding(|b| {
        b.machine
            .lock()
            .tile(b.tile)
            .map(|ts| ts.commands)
            .unwrap_or(0)
    })
    .unwrap_or(0)
}
