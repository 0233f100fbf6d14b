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

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::cfg;
use crate::mem;
use crate::tcu::{EpId, Reg, EP_REGS, TOTAL_EPS};

/// The number of external registers
pub const EXT_REGS: usize = 2;
/// The number of unprivileged registers
pub const UNPRIV_REGS: usize = 6;

/// The external registers, which are only accessible from other tiles
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum ExtReg {
    /// Stores the tile description
    TileDesc,
    /// For external commands
    ExtCmd,
}

/// The privileged registers
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum PrivReg {
    /// For privileged commands
    PrivCmd,
    /// The argument for privileged commands
    PrivCmdArg,
    /// The current activity
    CurAct,
}

/// The unprivileged registers
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum UnprivReg {
    /// Starts commands and signals their completion
    Command,
    /// Specifies the data address
    DataAddr,
    /// Specifies the data size
    DataSize,
    /// Specifies an additional argument
    Arg1,
    /// The current time in nanoseconds
    CurTime,
    /// The pending events
    Events,
}

/// The registers of an endpoint
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum EpReg {
    R0,
    R1,
    R2,
}

/// Identifies a single register of the TCU
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegKey {
    Ext(ExtReg),
    Unpriv(UnprivReg),
    Ep(EpId, EpReg),
    Priv(PrivReg),
}

impl RegKey {
    /// Returns the index of the register within the MMIO region of the TCU (in words)
    pub fn index(self) -> usize {
        match self {
            Self::Ext(r) => r as usize,
            Self::Unpriv(r) => EXT_REGS + r as usize,
            Self::Ep(ep, r) => {
                debug_assert!(ep < TOTAL_EPS);
                EXT_REGS + UNPRIV_REGS + EP_REGS * ep as usize + r as usize
            },
            Self::Priv(r) => (cfg::PAGE_SIZE * 2) / mem::size_of::<Reg>() + r as usize,
        }
    }
}

/// The commands
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum CmdOpCode {
    /// The idle command has no effect
    Idle,
    /// Sends a message
    Send,
    /// Replies to a message
    Reply,
    /// Reads from external memory
    Read,
    /// Writes to external memory
    Write,
    /// Fetches a message
    FetchMsg,
    /// Fetches and clears the pending events
    FetchEvents,
    /// Sets events
    SetEvent,
    /// Acknowledges a message
    AckMsg,
    /// Puts the CU to sleep
    Sleep,
    /// Prints a string
    Print,
}

/// The external commands
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum ExtCmdOpCode {
    /// The idle command has no effect
    Idle,
    /// Invalidate and endpoint, if possible
    InvEP,
    /// Reset the CU
    Reset,
}

bitflags! {
    /// The events the TCU records until they are fetched
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct EventMask : Reg {
        /// A message has been received
        const MSG_RECV      = 1 << 0;
        /// A credit has been received
        const CRD_RECV      = 1 << 1;
        /// An endpoint has been invalidated
        const EP_INVAL      = 1 << 2;
        /// A user-defined event
        const USER          = 1 << 3;
    }
}

/// Builds the value for the command register
pub fn build_cmd(ep: EpId, cmd: CmdOpCode, arg: Reg) -> Reg {
    cmd as Reg | ((ep as Reg) << 4) | (arg << 25)
}

/// Splits the value of the command register into opcode, endpoint, error, and argument
pub fn split_cmd(cmd: Reg) -> (CmdOpCode, EpId, u32, Reg) {
    (
        CmdOpCode::try_from(cmd & 0xF).unwrap_or(CmdOpCode::Idle),
        ((cmd >> 4) & 0xFFFF) as EpId,
        ((cmd >> 20) & 0x1F) as u32,
        cmd >> 25,
    )
}

/// Builds the value for the external command register
///
/// The opcode is stored in bits 0..4, the error in bits 4..9, the endpoint in bits 9..25, and the
/// force flag in bit 25.
pub fn build_ext_cmd(ep: EpId, cmd: ExtCmdOpCode, force: bool) -> Reg {
    cmd as Reg | (ep as Reg) << 9 | (force as Reg) << 25
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices() {
        assert_eq!(RegKey::Ext(ExtReg::TileDesc).index(), 0);
        assert_eq!(RegKey::Unpriv(UnprivReg::Command).index(), EXT_REGS);
        assert_eq!(RegKey::Unpriv(UnprivReg::Events).index(), EXT_REGS + 5);
        assert_eq!(RegKey::Ep(0, EpReg::R0).index(), EXT_REGS + UNPRIV_REGS);
        assert_eq!(
            RegKey::Ep(2, EpReg::R1).index(),
            EXT_REGS + UNPRIV_REGS + 2 * EP_REGS + 1
        );
        assert_eq!(RegKey::Priv(PrivReg::CurAct).index(), 1024 + 2);
    }

    #[test]
    fn commands() {
        let cmd = build_cmd(17, CmdOpCode::Reply, 0x40);
        assert_eq!(cmd & 0xF, CmdOpCode::Reply as Reg);
        assert_eq!(split_cmd(cmd), (CmdOpCode::Reply, 17, 0, 0x40));

        // the error code is stored in bits 20..25
        let done = (cmd & !0xF) | (10 << 20);
        assert_eq!(split_cmd(done), (CmdOpCode::Idle, 17, 10, 0x40));
    }
}
