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

use core::fmt;

use crate::cap::{CapFlags, Capability, Selector};
use crate::cell::RefCell;
use crate::com::{GateIStream, RecvGate};
use crate::errors::{Code, Error};
use crate::io::LogFlags;
use crate::kif::{
    service::{ExchangeData, ExchangeReply, OpenReply, Request},
    syscalls::{ExchangeArgs, MAX_EXCHG_ARGS},
    CapRngDesc,
};
use crate::log;
use crate::rc::Rc;
use crate::serialize::{M3Deserializer, M3Serializer, SliceSink};
use crate::server::{SessId, SessionContainer};
use crate::syscalls;
use crate::tiles::Activity;
use crate::util::math;
use crate::workloop::WorkLoop;

const MSG_SIZE: usize = 256;
const BUF_SIZE: usize = MSG_SIZE * 4;

/// Describes the type of capability exchange including the number of capabilities
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExcType {
    /// A delegate (client copies caps to the server)
    Del(u64),
    /// An obtain (server copies caps to the client)
    Obt(u64),
}

/// The struct to exchange capabilities with a client (obtain/delegate)
pub struct CapExchange<'d> {
    ty: ExcType,
    src: M3Deserializer<'d>,
    sink: M3Serializer<SliceSink<'d>>,
    pub(crate) out_crd: CapRngDesc,
}

impl<'d> CapExchange<'d> {
    /// Creates a new `CapExchange` object, taking input arguments from `input` and putting output
    /// arguments into `output`.
    pub fn new(ty: ExcType, input: &'d ExchangeData, output: &'d mut [u64]) -> Self {
        Self {
            ty,
            src: M3Deserializer::new(input.args.words()),
            sink: M3Serializer::new(SliceSink::new(output)),
            out_crd: CapRngDesc::default(),
        }
    }

    /// Returns the type of exchange including the number of capabilities
    pub fn ty(&self) -> ExcType {
        self.ty
    }

    /// Returns the input arguments
    pub fn in_args(&mut self) -> &mut M3Deserializer<'d> {
        &mut self.src
    }

    /// Returns the output arguments
    pub fn out_args(&mut self) -> &mut M3Serializer<SliceSink<'d>> {
        &mut self.sink
    }

    /// Sets the output capabilities to given [`CapRngDesc`]
    ///
    /// For an obtain, these are the capabilities of the server that are handed out. For a
    /// delegate, these are the free selectors of the server that receive the client's
    /// capabilities.
    pub fn out_caps(&mut self, crd: CapRngDesc) {
        self.out_crd = crd;
    }
}

impl<'d> fmt::Debug for CapExchange<'d> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            fmt,
            "CapExchange[ty={:?}, out_crd={:?}]",
            self.ty, self.out_crd,
        )
    }
}

/// The handler customizes a [`Server`] by defining the opening and closing of sessions and
/// capability exchanges.
///
/// For every request the [`Server`] receives from the kernel, it calls the corresponding function
/// of `Handler`.
pub trait Handler<S> {
    /// Returns the session container
    fn sessions(&mut self) -> &mut SessionContainer<S>;

    /// Is called during the creation of the server
    fn init(&mut self, _serv: &Server) {
    }

    /// Opens a new session for a client with the given argument for the service with selector
    /// `srv_sel`
    ///
    /// Returns the used session selector and session identifier.
    fn open(&mut self, srv_sel: Selector, arg: &str) -> Result<(Selector, SessId), Error>;

    /// Lets the client obtain capabilities from the server
    fn obtain(&mut self, _sid: SessId, _xchg: &mut CapExchange<'_>) -> Result<(), Error> {
        Err(Error::new(Code::NotSup))
    }

    /// Lets the client delegate capabilities to the server
    fn delegate(&mut self, _sid: SessId, _xchg: &mut CapExchange<'_>) -> Result<(), Error> {
        Err(Error::new(Code::NotSup))
    }

    /// Closes the given session
    fn close(&mut self, _sid: SessId) {
    }

    /// Performs cleanup actions before shutdown
    fn shutdown(&mut self) {
    }
}

/// Represents a server that provides a service for clients.
///
/// The server receives the requests of the kernel on its service [`RecvGate`]: opening and closing
/// sessions and exchanging capabilities over sessions. How these requests are handled is defined
/// by the [`Handler`].
pub struct Server {
    cap: Capability,
    rgate: Rc<RecvGate>,
}

impl Server {
    /// Creates a new server with given service name.
    pub fn new<H, S>(name: &str, hdl: &mut H) -> Result<Self, Error>
    where
        H: Handler<S>,
    {
        let sel = Activity::own().alloc_sel();
        let rgate = RecvGate::new(math::next_log2(BUF_SIZE), math::next_log2(MSG_SIZE))?;
        rgate.activate()?;

        syscalls::create_srv(sel, rgate.sel(), name)?;
        log!(LogFlags::LibServ, "server: created service '{}' at {}", name, sel);

        let serv = Server {
            cap: Capability::new(sel, CapFlags::empty()),
            rgate: Rc::new(rgate),
        };
        hdl.init(&serv);
        Ok(serv)
    }

    /// Returns the capability selector of the service
    pub fn sel(&self) -> Selector {
        self.cap.sel()
    }

    /// Returns the receive gate that is used for the service protocol
    pub fn rgate(&self) -> &Rc<RecvGate> {
        &self.rgate
    }

    /// Fetches a message from the service gate and handles it if so.
    ///
    /// Returns [`Code::EndOfFile`] if the server should shut down
    pub fn fetch_and_handle<H, S>(&self, hdl: &mut H) -> Result<(), Error>
    where
        H: Handler<S>,
    {
        if let Some(msg) = self.rgate.fetch() {
            let mut is = GateIStream::new(msg, &self.rgate);
            match Self::handle(hdl, self.sel(), &mut is) {
                Ok(true) => return Err(Error::new(Code::EndOfFile)),
                Ok(false) => {},
                Err(e) => {
                    log!(LogFlags::LibServ, "Service request failed: {:?}", e);
                    is.reply_error(e.code()).ok();
                },
            }
        }
        Ok(())
    }

    /// Adds a work item to `wl` that handles the requests of the kernel via `hdl`
    ///
    /// The workloop is stopped on shutdown.
    pub fn start<H, S>(&self, wl: &Rc<WorkLoop>, hdl: Rc<RefCell<H>>) -> Result<(), Error>
    where
        H: Handler<S> + 'static,
    {
        let sel = self.sel();
        let wl_ref = Rc::downgrade(wl);
        self.rgate.start(wl, move |is| {
            if Self::handle(&mut *hdl.borrow_mut(), sel, is)? {
                if let Some(wl) = wl_ref.upgrade() {
                    wl.stop();
                }
            }
            Ok(())
        })
    }

    fn handle<H, S>(hdl: &mut H, sel: Selector, is: &mut GateIStream<'_>) -> Result<bool, Error>
    where
        H: Handler<S>,
    {
        let req: Request<'static> = is.pop()?;
        match req {
            Request::Open { arg } => Self::handle_open(hdl, sel, is, arg),
            Request::Obtain { sid, data } => {
                Self::handle_exchange(hdl, is, sid as SessId, &data, true)
            },
            Request::Delegate { sid, data } => {
                Self::handle_exchange(hdl, is, sid as SessId, &data, false)
            },
            Request::Close { sid } => Self::handle_close(hdl, is, sid as SessId),
            Request::Shutdown => {
                log!(LogFlags::LibServ, "server::shutdown()");
                hdl.shutdown();
                is.reply_error(Code::Success)?;
                return Ok(true);
            },
        }
        .map(|_| false)
    }

    fn handle_open<H, S>(
        hdl: &mut H,
        sel: Selector,
        is: &mut GateIStream<'_>,
        arg: &str,
    ) -> Result<(), Error>
    where
        H: Handler<S>,
    {
        let res = hdl.open(sel, arg);

        log!(LogFlags::LibServ, "server::open(arg={}) -> {:?}", arg, res);

        match res {
            Ok((sel, ident)) => reply_vmsg!(is, OpenReply {
                res: Code::Success,
                sid: sel,
                ident: ident as u64,
            }),
            Err(e) => reply_vmsg!(is, OpenReply {
                res: e.code(),
                sid: 0,
                ident: 0,
            }),
        }
    }

    fn handle_exchange<H, S>(
        hdl: &mut H,
        is: &mut GateIStream<'_>,
        sid: SessId,
        data: &ExchangeData,
        obtain: bool,
    ) -> Result<(), Error>
    where
        H: Handler<S>,
    {
        let ty = if obtain {
            ExcType::Obt(data.caps.count())
        }
        else {
            ExcType::Del(data.caps.count())
        };

        let mut out = [0u64; MAX_EXCHG_ARGS];
        let (res, args_len, crd) = {
            let mut xchg = CapExchange::new(ty, data, &mut out);

            let res = if hdl.sessions().get(sid).is_none() {
                Err(Error::new(Code::InvArgs))
            }
            else if obtain {
                hdl.obtain(sid, &mut xchg)
            }
            else {
                hdl.delegate(sid, &mut xchg)
            };

            log!(
                LogFlags::LibServ,
                "server::exchange(sid={}, xchg={:?}) -> {:?}",
                sid,
                xchg,
                res
            );

            let len = xchg.out_args().words().len();
            (res, len, xchg.out_crd)
        };

        let reply = ExchangeReply {
            res: res.err().map(|e| e.code()).unwrap_or(Code::Success),
            data: ExchangeData {
                caps: crd,
                args: ExchangeArgs::new(&out[..args_len]),
            },
        };
        reply_vmsg!(is, reply)
    }

    fn handle_close<H, S>(hdl: &mut H, is: &mut GateIStream<'_>, sid: SessId) -> Result<(), Error>
    where
        H: Handler<S>,
    {
        log!(LogFlags::LibServ, "server::close(sid={})", sid);

        if hdl.sessions().get(sid).is_none() {
            return Err(Error::new(Code::InvArgs));
        }

        hdl.close(sid);

        is.reply_error(Code::Success)
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Server[sel: {}, rgate: {:?}]", self.sel(), self.rgate)
    }
}
