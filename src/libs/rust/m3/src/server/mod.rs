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

//! Contains server-related abstractions.
//!
//! A [`Server`] registers a service at the kernel and handles its requests (opening and closing
//! sessions, exchanging capabilities) via a [`Handler`]. The [`RequestHandler`] is a handler for
//! the typical server that receives requests from its clients over a [`RecvGate`]: each session
//! gets one or more [`SendGate`]s to that gate, labeled with the session id.
//!
//! [`RecvGate`]: crate::com::RecvGate
//! [`SendGate`]: crate::com::SendGate

mod reqhdl;
#[allow(clippy::module_inception)]
mod server;
mod sesscon;
mod session;

pub use self::reqhdl::{
    ClientManager, MsgHandlerFunc, RequestHandler, RequestSession, DEF_MAX_CLIENTS, DEF_MSG_SIZE,
};
pub use self::server::{CapExchange, ExcType, Handler, Server};
pub use self::sesscon::{SessId, SessionContainer, MAX_SESSIONS};
pub use self::session::ServerSession;
