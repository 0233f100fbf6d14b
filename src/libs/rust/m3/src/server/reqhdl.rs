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

use core::fmt::Debug;
use core::marker::PhantomData;

use crate::boxed::Box;
use crate::cap::Selector;
use crate::cell::RefCell;
use crate::col::{String, Vec};
use crate::com::{GateIStream, RecvGate, SGateArgs, SendGate};
use crate::errors::{Code, Error};
use crate::format;
use crate::io::LogFlags;
use crate::kif::{self, service::CONNECT_OP};
use crate::log;
use crate::rc::Rc;
use crate::server::{CapExchange, ExcType, Handler, Server, ServerSession, SessId, SessionContainer};
use crate::tcu::Label;
use crate::util::math;
use crate::workloop::WorkLoop;

/// The default maximum number of clients a service supports
pub const DEF_MAX_CLIENTS: usize = 8;

/// The default message size used for the requests
pub const DEF_MSG_SIZE: usize = 64;

/// Represents a session that can be used for request handling from clients
pub trait RequestSession {
    /// Creates a new instance of the session with given arguments.
    ///
    /// The argument `serv` is the server session object, and `arg` is the argument the client
    /// opened the session with.
    fn new(serv: ServerSession, arg: &str) -> Result<Self, Error>
    where
        Self: Sized;

    /// Is called after the session has been removed
    fn close(&mut self, _sid: SessId) {
    }
}

/// The client manager holds all sessions and the connections to clients
///
/// Every connection is a [`SendGate`] to the request [`RecvGate`], labeled with the id of the
/// session it belongs to.
pub struct ClientManager<S> {
    serv_sel: Selector,
    sessions: SessionContainer<S>,
    // dropped before the receive gate they refer to
    sgates: Vec<(SessId, SendGate)>,
    rgate: Rc<RecvGate>,
    max_cli_cons: usize,
}

impl<S: RequestSession> ClientManager<S> {
    /// Creates a new client manager for `max_clients` using a message size of `msg_size`.
    /// Additionally, `max_cli_cons` defines the maximum connections each client session may create.
    pub fn new(max_clients: usize, msg_size: usize, max_cli_cons: usize) -> Result<Self, Error> {
        let rgate = RecvGate::new(
            math::next_log2(max_clients * msg_size),
            math::next_log2(msg_size),
        )?;
        rgate.activate()?;
        Ok(Self {
            // set as soon as the server is created
            serv_sel: kif::INVALID_SEL,
            sessions: SessionContainer::new(max_clients),
            sgates: Vec::new(),
            rgate: Rc::new(rgate),
            max_cli_cons,
        })
    }

    /// Returns the receive gate that is used to receive requests from clients
    pub fn recv_gate(&self) -> &Rc<RecvGate> {
        &self.rgate
    }

    /// Returns the sessions
    pub fn sessions(&self) -> &SessionContainer<S> {
        &self.sessions
    }

    /// Returns a reference to the session with given id
    pub fn get(&self, sid: SessId) -> Option<&S> {
        self.sessions.get(sid)
    }

    /// Returns a mutable reference to the session with given id
    pub fn get_mut(&mut self, sid: SessId) -> Option<&mut S> {
        self.sessions.get_mut(sid)
    }

    fn open(&mut self, arg: &str) -> Result<(Selector, SessId), Error> {
        let sid = self.sessions.next_id()?;
        let serv = ServerSession::new(self.serv_sel, sid)?;
        let sel = serv.sel();
        let sess = S::new(serv, arg)?;
        self.sessions.add(sid, sess)?;
        Ok((sel, sid))
    }

    /// Adds a new connection ([`SendGate`]) for the existing session with given id.
    ///
    /// Returns the selector of the [`SendGate`]
    pub fn add_connection_to(&mut self, sid: SessId) -> Result<Selector, Error> {
        let cons = self.sgates.iter().filter(|s| s.0 == sid).count();
        if cons + 1 > self.max_cli_cons {
            return Err(Error::new(Code::NoSpace));
        }

        let sgate = SendGate::new_with(SGateArgs::new(&self.rgate).label(sid as Label).credits(1))?;
        let sel = sgate.sel();
        self.sgates.push((sid, sgate));
        Ok(sel)
    }

    /// Removes the session with given id
    ///
    /// The connections of the session are revoked first and all of its messages that are still
    /// in the receive buffer are dropped afterwards.
    pub fn remove(&mut self, sid: SessId) {
        self.sgates.retain(|s| s.0 != sid);

        if let Some(mut sess) = self.sessions.remove(sid) {
            sess.close(sid);
            self.rgate.drop_msgs_with(sid as Label);
        }
    }

    fn connect(&mut self, sid: SessId, xchg: &mut CapExchange<'_>) -> Result<(), Error> {
        if xchg.ty() != ExcType::Obt(1) {
            return Err(Error::new(Code::InvArgs));
        }

        let sel = self.add_connection_to(sid)?;
        xchg.out_caps(kif::CapRngDesc::new(kif::CapType::Object, sel, 1));
        Ok(())
    }
}

type CapHandlerFunc<S> =
    dyn Fn(&mut ClientManager<S>, SessId, &mut CapExchange<'_>) -> Result<(), Error>;

struct CapHandler<S> {
    ty: ExcType,
    func: Option<Box<CapHandlerFunc<S>>>,
}

/// A handler function for messages
pub type MsgHandlerFunc<S> = Option<Box<dyn Fn(&mut S, &mut GateIStream<'_>) -> Result<(), Error>>>;

/// Handles requests from clients
///
/// Clients obtain a [`SendGate`] to the request [`RecvGate`] via an obtain with [`CONNECT_OP`] as
/// first argument. Afterwards, they send requests with the opcode as first word, which are
/// dispatched to the message handlers registered via
/// [`reg_msg_handler`](RequestHandler::reg_msg_handler). Other capability exchanges are
/// dispatched to the handlers registered via [`reg_cap_handler`](RequestHandler::reg_cap_handler).
pub struct RequestHandler<S, O> {
    clients: ClientManager<S>,
    msg_hdls: Vec<MsgHandlerFunc<S>>,
    cap_hdls: Vec<CapHandler<S>>,
    _opcode: PhantomData<O>,
}

impl<S: RequestSession, O: Into<u64> + TryFrom<u64> + Debug> RequestHandler<S, O> {
    /// Creates a new request handler with default arguments
    pub fn new() -> Result<Self, Error> {
        Self::new_with(DEF_MAX_CLIENTS, DEF_MSG_SIZE, 1)
    }

    /// Creates a new request handler for `max_clients` using a message size of `msg_size`.
    /// Additionally, `max_cli_cons` defines the maximum connections each client session may create.
    pub fn new_with(
        max_clients: usize,
        msg_size: usize,
        max_cli_cons: usize,
    ) -> Result<Self, Error> {
        Ok(Self {
            clients: ClientManager::new(max_clients, msg_size, max_cli_cons)?,
            msg_hdls: Vec::new(),
            cap_hdls: Vec::new(),
            _opcode: PhantomData,
        })
    }

    /// Returns a reference to the client manager
    pub fn clients(&self) -> &ClientManager<S> {
        &self.clients
    }

    /// Returns a mutable reference to the client manager
    pub fn clients_mut(&mut self) -> &mut ClientManager<S> {
        &mut self.clients
    }

    /// Registers `func` as the capability handler for given opcode and exchange type
    ///
    /// The handler is called for exchanges whose first argument is `opcode` and whose type
    /// (including the number of capabilities) equals `ty`.
    pub fn reg_cap_handler<F>(&mut self, opcode: O, ty: ExcType, func: F)
    where
        F: Fn(&mut ClientManager<S>, SessId, &mut CapExchange<'_>) -> Result<(), Error> + 'static,
    {
        let idx = opcode.into() as usize;
        while idx >= self.cap_hdls.len() {
            self.cap_hdls.push(CapHandler {
                ty: ExcType::Del(1),
                func: None,
            });
        }
        assert!(self.cap_hdls[idx].func.is_none());
        self.cap_hdls[idx] = CapHandler {
            ty,
            func: Some(Box::new(func)),
        };
    }

    /// Registers `func` as the message handler for the given opcode
    ///
    /// The function is expected to reply to the client unless there is an error. In the latter
    /// case, the error code is sent back.
    pub fn reg_msg_handler<F>(&mut self, opcode: O, func: F)
    where
        F: Fn(&mut S, &mut GateIStream<'_>) -> Result<(), Error> + 'static,
    {
        let idx = opcode.into() as usize;
        while idx >= self.msg_hdls.len() {
            self.msg_hdls.push(None);
        }
        assert!(self.msg_hdls[idx].is_none());
        self.msg_hdls[idx] = Some(Box::new(func));
    }

    fn op_name(opcode: u64) -> String {
        match O::try_from(opcode) {
            Ok(op) => format!("{:?}:{}", op, opcode),
            Err(_) if opcode == CONNECT_OP => format!("Connect"),
            Err(_) => format!("??:{}", opcode),
        }
    }

    fn handle_capxchg(&mut self, sid: SessId, xchg: &mut CapExchange<'_>) -> Result<(), Error> {
        let opcode = xchg.in_args().pop::<u64>()?;

        log!(
            LogFlags::LibServ,
            "server::exchange(sid={}, ty={:?}, op={})",
            sid,
            xchg.ty(),
            Self::op_name(opcode),
        );

        if opcode == CONNECT_OP {
            return self.clients.connect(sid, xchg);
        }

        let Self {
            clients, cap_hdls, ..
        } = self;
        match cap_hdls.get(opcode as usize) {
            Some(CapHandler {
                ty,
                func: Some(func),
            }) if *ty == xchg.ty() => func(clients, sid, xchg),
            _ => Err(Error::new(Code::InvArgs)),
        }
    }

    /// Handles the client request in `is`
    ///
    /// Errors are returned to the caller, which replies them to the client.
    pub fn handle_msg(&mut self, is: &mut GateIStream<'_>) -> Result<(), Error> {
        let opcode = is.pop::<u64>()?;
        let sid = is.label() as SessId;

        log!(
            LogFlags::LibServReqs,
            "server::request(sid={}, op={})",
            sid,
            Self::op_name(opcode),
        );

        let sess = self
            .clients
            .sessions
            .get_mut(sid)
            .ok_or_else(|| Error::new(Code::InvArgs))?;
        let res = match self.msg_hdls.get(opcode as usize) {
            Some(Some(f)) => f(sess, is),
            _ => Err(Error::new(Code::InvArgs)),
        };

        log!(
            LogFlags::LibServReqs,
            "server::request(sid={}, op={}) -> {:?}",
            sid,
            Self::op_name(opcode),
            res,
        );
        res
    }

    /// Fetches the next message from the request gate and handles it, if there is any
    pub fn fetch_and_handle_msg(&mut self) {
        let rgate = self.clients.rgate.clone();
        if let Some(msg) = rgate.fetch() {
            let mut is = GateIStream::new(msg, &rgate);
            if let Err(e) = self.handle_msg(&mut is) {
                is.reply_error(e.code()).ok();
            }
        }
    }
}

impl<S, O> RequestHandler<S, O>
where
    S: RequestSession + 'static,
    O: Into<u64> + TryFrom<u64> + Debug + 'static,
{
    /// Adds a work item to `wl` that handles the requests of the clients
    pub fn start(this: &Rc<RefCell<Self>>, wl: &Rc<WorkLoop>) -> Result<(), Error> {
        let rgate = this.borrow().clients.rgate.clone();
        let hdl = this.clone();
        rgate.start(wl, move |is| hdl.borrow_mut().handle_msg(is))
    }

    /// Runs a workloop that serves the kernel requests for `srv` and the client requests until
    /// the server is shut down or the workloop is stopped via `wl`
    pub fn run(this: &Rc<RefCell<Self>>, srv: &Server, wl: &Rc<WorkLoop>) -> Result<(), Error> {
        srv.start(wl, this.clone())?;
        Self::start(this, wl)?;
        let res = wl.run();
        srv.rgate().stop();
        this.borrow().clients.rgate.stop();
        res
    }
}

impl<S: RequestSession, O: Into<u64> + TryFrom<u64> + Debug> Handler<S> for RequestHandler<S, O> {
    fn sessions(&mut self) -> &mut SessionContainer<S> {
        &mut self.clients.sessions
    }

    fn init(&mut self, serv: &Server) {
        self.clients.serv_sel = serv.sel();
    }

    fn open(&mut self, _srv_sel: Selector, arg: &str) -> Result<(Selector, SessId), Error> {
        self.clients.open(arg)
    }

    fn obtain(&mut self, sid: SessId, xchg: &mut CapExchange<'_>) -> Result<(), Error> {
        self.handle_capxchg(sid, xchg)
    }

    fn delegate(&mut self, sid: SessId, xchg: &mut CapExchange<'_>) -> Result<(), Error> {
        self.handle_capxchg(sid, xchg)
    }

    fn close(&mut self, sid: SessId) {
        self.clients.remove(sid);
    }
}
