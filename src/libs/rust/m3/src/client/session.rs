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
use crate::com::SendGate;
use crate::errors::Error;
use crate::kif::{
    self,
    service::CONNECT_OP,
    syscalls::{ExchangeArgs, MAX_EXCHG_ARGS},
};
use crate::serialize::{M3Deserializer, M3Serializer, SliceSink};
use crate::syscalls;
use crate::tiles::{self, Activity};

/// Represents an established connection to a server that can be used to exchange capabilities.
///
/// Sessions are opened via the resource manager, which asks the server to create the session.
/// On drop, the session is closed again via the resource manager, which lets the kernel notify
/// the server.
pub struct ClientSession {
    cap: Capability,
    close: bool,
}

impl ClientSession {
    /// Creates a new `ClientSession` by connecting to the service with given name.
    pub fn new(name: &str) -> Result<Self, Error> {
        Self::new_with_arg(name, "")
    }

    /// Creates a new `ClientSession` by connecting to the service with given name, passing `arg`
    /// to the server.
    pub fn new_with_arg(name: &str, arg: &str) -> Result<Self, Error> {
        Self::new_with_sel(name, arg, Activity::own().alloc_sel())
    }

    /// Creates a new `ClientSession` by connecting to the service with given name, using the given
    /// capability selector for the session.
    pub fn new_with_sel(name: &str, arg: &str, sel: Selector) -> Result<Self, Error> {
        Activity::own().resmng()?.open_sess(sel, name, arg)?;

        Ok(ClientSession {
            cap: Capability::new(sel, CapFlags::KEEP_CAP),
            close: true,
        })
    }

    /// Binds a new `ClientSession` to given selector.
    pub fn new_bind(sel: Selector) -> Self {
        ClientSession {
            cap: Capability::new(sel, CapFlags::KEEP_CAP),
            close: false,
        }
    }

    /// Returns the capability selector.
    pub fn sel(&self) -> Selector {
        self.cap.sel()
    }

    /// Obtains a [`SendGate`] to the request gate of the server
    pub fn connect(&self) -> Result<SendGate, Error> {
        let crd = self.obtain(1, |os| os.push(CONNECT_OP), |_| Ok(()))?;
        Ok(SendGate::new_owned_bind(crd.start()))
    }

    /// Delegates the object capability with selector `sel` to the server.
    pub fn delegate_obj(&self, sel: Selector) -> Result<(), Error> {
        let crd = kif::CapRngDesc::new(kif::CapType::Object, sel, 1);
        self.delegate_crd(crd)
    }

    /// Delegates the given capability range to the server.
    pub fn delegate_crd(&self, crd: kif::CapRngDesc) -> Result<(), Error> {
        self.delegate(crd, |_| {}, |_| Ok(()))
    }

    /// Delegates the given capability range to the server, using `pre` and `post` for input and
    /// output arguments.
    ///
    /// `pre` is called with a serializer before the delegation, allowing to pass arguments to the
    /// server. `post` is called with a deserializer for the server's reply arguments afterwards.
    pub fn delegate<PRE, POST>(
        &self,
        crd: kif::CapRngDesc,
        pre: PRE,
        post: POST,
    ) -> Result<(), Error>
    where
        PRE: FnOnce(&mut M3Serializer<SliceSink<'_>>),
        POST: FnOnce(&mut M3Deserializer<'_>) -> Result<(), Error>,
    {
        self.delegate_for(Activity::own().sel(), crd, pre, post)
    }

    /// Delegates the given capability range of activity `act` to the server, using `pre` and
    /// `post` for input and output arguments.
    pub fn delegate_for<PRE, POST>(
        &self,
        act: Selector,
        crd: kif::CapRngDesc,
        pre: PRE,
        post: POST,
    ) -> Result<(), Error>
    where
        PRE: FnOnce(&mut M3Serializer<SliceSink<'_>>),
        POST: FnOnce(&mut M3Deserializer<'_>) -> Result<(), Error>,
    {
        let mut args = build_args(pre);
        syscalls::delegate(act, self.sel(), crd, &mut args)?;
        post(&mut M3Deserializer::new(args.words()))
    }

    /// Obtains an object capability from the server and returns its selector.
    pub fn obtain_obj(&self) -> Result<Selector, Error> {
        self.obtain_crd(1).map(|res| res.start())
    }

    /// Obtains `count` capabilities from the server and returns the capability range descriptor.
    pub fn obtain_crd(&self, count: u64) -> Result<kif::CapRngDesc, Error> {
        self.obtain(count, |_| {}, |_| Ok(()))
    }

    /// Obtains `count` capabilities from the server and returns the capability range descriptor,
    /// using `pre` and `post` for input and output arguments.
    pub fn obtain<PRE, POST>(
        &self,
        count: u64,
        pre: PRE,
        post: POST,
    ) -> Result<kif::CapRngDesc, Error>
    where
        PRE: FnOnce(&mut M3Serializer<SliceSink<'_>>),
        POST: FnOnce(&mut M3Deserializer<'_>) -> Result<(), Error>,
    {
        let caps = Activity::own().alloc_sels(count);
        let crd = kif::CapRngDesc::new(kif::CapType::Object, caps, count);
        self.obtain_for(Activity::own().sel(), crd, pre, post)?;
        Ok(crd)
    }

    /// Obtains capabilities from the server into `crd` of activity `act`, using `pre` and `post`
    /// for input and output arguments.
    pub fn obtain_for<PRE, POST>(
        &self,
        act: Selector,
        crd: kif::CapRngDesc,
        pre: PRE,
        post: POST,
    ) -> Result<(), Error>
    where
        PRE: FnOnce(&mut M3Serializer<SliceSink<'_>>),
        POST: FnOnce(&mut M3Deserializer<'_>) -> Result<(), Error>,
    {
        let mut args = build_args(pre);
        syscalls::obtain(act, self.sel(), crd, &mut args)?;
        post(&mut M3Deserializer::new(args.words()))
    }
}

fn build_args<PRE>(pre: PRE) -> ExchangeArgs
where
    PRE: FnOnce(&mut M3Serializer<SliceSink<'_>>),
{
    let mut words = [0u64; MAX_EXCHG_ARGS];
    let len = {
        let mut os = M3Serializer::new(SliceSink::new(&mut words));
        pre(&mut os);
        os.words().len()
    };
    ExchangeArgs::new(&words[..len])
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        if self.close && !tiles::is_leaving() {
            if let Some(rmng) = Activity::try_own().and_then(|a| a.resmng().ok()) {
                rmng.close_sess(self.sel()).ok();
            }
        }
    }
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "ClientSession[sel: {}]", self.sel())
    }
}
