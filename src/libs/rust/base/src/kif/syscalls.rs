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

//! The system call interface
//!
//! Every system call is a message on the syscall send gate that starts with the [`Operation`],
//! followed by the serialized request struct. The reply starts with the error code, followed by
//! the reply struct of the operation, if any.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::errors::Code;
use crate::kif::{CapRngDesc, CapSel, Perm};
use crate::mem::GlobOff;
use crate::quota::Id as QuotaId;
use crate::serialize::{Deserialize, Serialize};
use crate::tcu::{ActId, EpId, Label, TileId};

/// The maximum size of a system call message in bytes
pub const MAX_MSG_SIZE: usize = 440;

/// The maximum length of names that are passed to the kernel
pub const MAX_NAME_LEN: usize = 32;

/// The maximum number of arguments for the exchange syscalls
pub const MAX_EXCHG_ARGS: usize = 8;

/// The maximum number of activities one can wait for
pub const MAX_WAIT_ACTS: usize = 32;

/// The system calls
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize_repr,
    Deserialize_repr,
)]
#[repr(u64)]
pub enum Operation {
    // Capability creations
    CreateSrv,
    CreateSess,
    CreateMGate,
    CreateRGate,
    CreateSGate,
    CreateMap,
    CreateAct,
    CreateSem,
    AllocEPs,

    // Capability operations
    Activate,
    ActCtrl,
    ActWait,
    DeriveMem,
    DeriveKMem,
    DeriveTile,
    MGateRegion,
    RGateBuffer,
    KMemQuota,
    TileQuota,
    SemCtrl,

    // Capability exchange
    Delegate,
    Obtain,
    Exchange,
    Revoke,

    // Misc
    Noop,
}

impl Operation {
    /// Returns the name of the operation, which is used as the origin of errors
    pub fn name(self) -> &'static str {
        match self {
            Self::CreateSrv => "CreateSrv",
            Self::CreateSess => "CreateSess",
            Self::CreateMGate => "CreateMGate",
            Self::CreateRGate => "CreateRGate",
            Self::CreateSGate => "CreateSGate",
            Self::CreateMap => "CreateMap",
            Self::CreateAct => "CreateAct",
            Self::CreateSem => "CreateSem",
            Self::AllocEPs => "AllocEPs",
            Self::Activate => "Activate",
            Self::ActCtrl => "ActCtrl",
            Self::ActWait => "ActWait",
            Self::DeriveMem => "DeriveMem",
            Self::DeriveKMem => "DeriveKMem",
            Self::DeriveTile => "DeriveTile",
            Self::MGateRegion => "MGateRegion",
            Self::RGateBuffer => "RGateBuffer",
            Self::KMemQuota => "KMemQuota",
            Self::TileQuota => "TileQuota",
            Self::SemCtrl => "SemCtrl",
            Self::Delegate => "Delegate",
            Self::Obtain => "Obtain",
            Self::Exchange => "Exchange",
            Self::Revoke => "Revoke",
            Self::Noop => "Noop",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct CreateSrv<'s> {
    pub dst: CapSel,
    pub rgate: CapSel,
    pub name: &'s str,
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct CreateSess {
    pub dst: CapSel,
    pub srv: CapSel,
    pub ident: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct CreateMGate {
    pub dst: CapSel,
    pub act: CapSel,
    pub addr: GlobOff,
    pub size: GlobOff,
    pub perms: Perm,
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct CreateRGate {
    pub dst: CapSel,
    pub order: u32,
    pub msg_order: u32,
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct CreateSGate {
    pub dst: CapSel,
    pub rgate: CapSel,
    pub label: Label,
    pub credits: u32,
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct CreateMap {
    pub dst: CapSel,
    pub act: CapSel,
    pub mgate: CapSel,
    pub first: CapSel,
    pub pages: CapSel,
    pub perms: Perm,
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct CreateActivity<'s> {
    pub dst: CapSel,
    pub tile: CapSel,
    pub kmem: CapSel,
    pub name: &'s str,
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct CreateSem {
    pub dst: CapSel,
    pub value: u32,
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct AllocEP {
    pub dst: CapSel,
    pub act: CapSel,
    pub epid: Option<EpId>,
    pub replies: u32,
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct Activate {
    pub ep: CapSel,
    pub gate: CapSel,
    pub rbuf_addr: GlobOff,
}

/// The operations for the `act_ctrl` system call
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize_repr,
    Deserialize_repr,
)]
#[repr(u64)]
pub enum ActivityOp {
    Init,
    Start,
    Stop,
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct ActivityCtrl {
    pub act: CapSel,
    pub op: ActivityOp,
    pub arg: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct ActivityWait {
    pub event: u64,
    pub act_count: usize,
    pub acts: [CapSel; MAX_WAIT_ACTS],
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct DeriveMem {
    pub act: CapSel,
    pub dst: CapSel,
    pub src: CapSel,
    pub offset: GlobOff,
    pub size: GlobOff,
    pub perms: Perm,
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct DeriveKMem {
    pub kmem: CapSel,
    pub dst: CapSel,
    pub quota: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct DeriveTile {
    pub tile: CapSel,
    pub dst: CapSel,
    pub eps: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct MGateRegion {
    pub mgate: CapSel,
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct RGateBuffer {
    pub rgate: CapSel,
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct KMemQuota {
    pub kmem: CapSel,
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct TileQuota {
    pub tile: CapSel,
}

/// The operations for the `sem_ctrl` system call
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize_repr,
    Deserialize_repr,
)]
#[repr(u64)]
pub enum SemOp {
    Up,
    Down,
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct SemCtrl {
    pub sem: CapSel,
    pub op: SemOp,
}

/// The arguments that are passed along with capabilities to services
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExchangeArgs {
    bytes: usize,
    data: [u64; MAX_EXCHG_ARGS],
}

impl ExchangeArgs {
    /// Creates new arguments from the given words
    pub fn new(words: &[u64]) -> Self {
        let mut args = Self::default();
        args.set_words(words);
        args
    }

    /// Returns the valid words
    pub fn words(&self) -> &[u64] {
        &self.data[0..self.bytes / 8]
    }

    /// Replaces the words by the given ones (truncating to [`MAX_EXCHG_ARGS`])
    pub fn set_words(&mut self, words: &[u64]) {
        let count = words.len().min(MAX_EXCHG_ARGS);
        self.data[0..count].copy_from_slice(&words[0..count]);
        self.bytes = count * 8;
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct ExchangeSess {
    pub act: CapSel,
    pub sess: CapSel,
    pub crd: CapRngDesc,
    pub args: ExchangeArgs,
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct Exchange {
    pub act: CapSel,
    pub own: CapRngDesc,
    pub other: CapSel,
    pub obtain: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct Revoke {
    pub act: CapSel,
    pub crd: CapRngDesc,
    pub own: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct Noop {}

/// The create activity reply message
#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct CreateActivityReply {
    pub id: ActId,
    pub eps_start: EpId,
}

/// The alloc endpoints reply message
#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct AllocEPReply {
    pub ep: EpId,
}

/// The activity wait reply message
#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct ActivityWaitReply {
    pub act_sel: CapSel,
    pub exitcode: Code,
}

/// The memory gate region reply message
#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct MGateRegionReply {
    pub tile: TileId,
    pub addr: GlobOff,
    pub size: GlobOff,
}

/// The receive gate buffer reply message
#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct RGateBufferReply {
    pub order: u32,
    pub msg_order: u32,
}

/// The kernel memory quota reply message
#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct KMemQuotaReply {
    pub id: QuotaId,
    pub total: usize,
    pub left: usize,
}

/// The tile quota reply message
#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct TileQuotaReply {
    pub eps_id: QuotaId,
    pub eps_total: u32,
    pub eps_left: u32,
}

/// The delegate/obtain reply message
#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct ExchangeSessReply {
    pub args: ExchangeArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::kif::CapType;
    use crate::mem::MsgBuf;
    use crate::serialize::{M3Deserializer, OStreamSize};

    #[test]
    fn opcodes() {
        assert_eq!(u64::from(Operation::CreateSrv), 0);
        assert_eq!(u64::from(Operation::AllocEPs), 8);
        assert_eq!(u64::from(Operation::Revoke), 23);
        assert_eq!(Operation::try_from(24).ok(), Some(Operation::Noop));
        assert!(Operation::try_from(25).is_err());
        assert_eq!(Operation::ActWait.name(), "ActWait");
    }

    #[test]
    fn request_layout() {
        let mut buf = MsgBuf::new();
        build_vmsg!(buf, Operation::Revoke, Revoke {
            act: 2,
            crd: CapRngDesc::new(CapType::Object, 10, 1),
            own: false,
        });
        assert_eq!(buf.size(), 4 * 8);
        assert_eq!(buf.words()[0], Operation::Revoke as u64);
        assert_eq!(buf.words()[2], CapRngDesc::new(CapType::Object, 10, 1).raw());

        let mut de = M3Deserializer::new(buf.words());
        assert_eq!(de.pop::<Operation>().unwrap(), Operation::Revoke);
        let req: Revoke = de.pop().unwrap();
        assert_eq!(req.act, 2);
        assert_eq!(req.crd.start(), 10);
        assert!(!req.own);
    }

    #[test]
    fn names_fit() {
        let mut buf = MsgBuf::new();
        let name = "a".repeat(MAX_NAME_LEN);
        build_vmsg!(buf, Operation::CreateAct, CreateActivity {
            dst: 5,
            tile: 6,
            kmem: 7,
            name: &name,
        });
        assert!(buf.size() <= MAX_MSG_SIZE);

        let mut de = M3Deserializer::new(buf.words());
        de.skip(1);
        let req: CreateActivity<'_> = de.pop().unwrap();
        assert_eq!(req.name, name);
    }

    #[test]
    fn wait_fits() {
        let mut buf = MsgBuf::new();
        build_vmsg!(buf, Operation::ActWait, ActivityWait {
            event: 0,
            act_count: 1,
            acts: [0; MAX_WAIT_ACTS],
        });
        assert!(buf.size() <= MAX_MSG_SIZE);
        assert!(<Code as OStreamSize>::OSIZE == 8);
    }

    #[test]
    fn exchange_args() {
        let args = ExchangeArgs::new(&[1, 2, 3]);
        assert_eq!(args.words(), &[1, 2, 3]);
        let args = ExchangeArgs::new(&[0; 12]);
        assert_eq!(args.words().len(), MAX_EXCHG_ARGS);
    }
}
