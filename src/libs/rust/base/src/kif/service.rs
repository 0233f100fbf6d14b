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

//! The service interface
//!
//! The kernel sends these requests to the service receive gate of a server. `Open` and `Close`
//! manage sessions, whereas `Obtain` and `Delegate` exchange capabilities over a session.

use super::syscalls::ExchangeArgs;
use crate::errors::Code;
use crate::kif::{CapRngDesc, CapSel};
use crate::serialize::{Deserialize, Serialize};

/// The first argument of an obtain to receive a send gate to the request receive gate of a
/// service. Its label identifies the session.
pub const CONNECT_OP: u64 = 0x8000_0000;

/// The data part of the delegate/obtain request messages
#[derive(Debug, Default, Serialize, Deserialize)]
#[repr(C)]
pub struct ExchangeData {
    pub caps: CapRngDesc,
    pub args: ExchangeArgs,
}

#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub enum Request<'s> {
    Open { arg: &'s str },
    Obtain { sid: u64, data: ExchangeData },
    Delegate { sid: u64, data: ExchangeData },
    Close { sid: u64 },
    Shutdown,
}

/// The open reply message
#[derive(Debug, Serialize, Deserialize)]
#[repr(C)]
pub struct OpenReply {
    pub res: Code,
    pub sid: CapSel,
    pub ident: u64,
}

/// The delegate/obtain reply message
#[derive(Debug, Default, Serialize, Deserialize)]
#[repr(C)]
pub struct ExchangeReply {
    pub res: Code,
    pub data: ExchangeData,
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::kif::CapType;
    use crate::mem::MsgBuf;
    use crate::serialize::M3Deserializer;

    #[test]
    fn requests() {
        let mut buf = MsgBuf::new();
        build_vmsg!(buf, Request::Open { arg: "foo" });
        let mut de = M3Deserializer::new(buf.words());
        match de.pop::<Request<'_>>().unwrap() {
            Request::Open { arg } => assert_eq!(arg, "foo"),
            r => panic!("unexpected request {:?}", r),
        }

        let mut buf = MsgBuf::new();
        build_vmsg!(buf, Request::Obtain {
            sid: 4,
            data: ExchangeData {
                caps: CapRngDesc::new(CapType::Object, 7, 2),
                args: ExchangeArgs::new(&[9]),
            },
        });
        let mut de = M3Deserializer::new(buf.words());
        match de.pop::<Request<'_>>().unwrap() {
            Request::Obtain { sid, data } => {
                assert_eq!(sid, 4);
                assert_eq!(data.caps.count(), 2);
                assert_eq!(data.args.words(), &[9]);
            },
            r => panic!("unexpected request {:?}", r),
        }

        let mut buf = MsgBuf::new();
        build_vmsg!(buf, Request::Shutdown);
        assert_eq!(buf.size(), 8);
    }
}
