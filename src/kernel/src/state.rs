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

use base::build_vmsg;
use base::col::{BTreeMap, String, Vec};
use base::errors::{Code, Error};
use base::io::LogFlags;
use base::kif::{self, service, CapRngDesc, CapSel};
use base::log;
use base::loopback::Machine;
use base::mem::MsgBuf;
use base::quota;
use base::rc::Rc;
use base::sync::Arc;
use base::tcu::{ActId, EpId, Label, Message};

use crate::cap::{
    CapRef, CapSpace, Capability, EPObject, GateObject, KObject, RGateObject, Released, CAP_SIZE,
};
use crate::com::{self, PendingOp, Service};
use crate::ktcu;
use crate::mem::{BootModule, MainMemory};
use crate::platform::KERNEL_TILE;
use crate::tiles::{self, Activity, TileMng};

/// The state of the kernel
///
/// The kernel is single threaded: all messages are handled one after another by the work loop,
/// which owns this state.
pub struct Kernel {
    pub machine: Arc<Machine>,
    pub caps: CapSpace,
    pub acts: BTreeMap<ActId, Activity>,
    pub tiles: TileMng,
    pub mem: MainMemory,
    pub mods: Vec<BootModule>,
    pub services: BTreeMap<String, Rc<Service>>,
    pub pending: BTreeMap<Label, PendingOp>,
    /// Activations of send gates that wait for their receive gate
    pub activations: Vec<(ActId, &'static Message)>,
    /// The receive gate of the resource manager
    pub rmng_rgate: Rc<RGateObject>,
    /// The children that have been announced to the resource manager, with their parents
    pub rmng_children: BTreeMap<ActId, ActId>,
    root_exit: Option<Code>,
    next_act: ActId,
    next_quota: quota::Id,
    next_req: Label,
    next_srv: u64,
}

impl Kernel {
    pub fn new(machine: Arc<Machine>, tiles: TileMng, mem: MainMemory, mods: Vec<BootModule>) -> Self {
        let (order, msg_order) = ktcu::rbuf_orders(ktcu::KRES_EP);
        let rmng_rgate = RGateObject::new(order, msg_order);
        rmng_rgate.activate(
            KERNEL_TILE,
            ktcu::KRES_EP,
            ktcu::rbuf_location(ktcu::KRES_EP),
        );

        Self {
            machine,
            caps: CapSpace::default(),
            acts: BTreeMap::new(),
            tiles,
            mem,
            mods,
            services: BTreeMap::new(),
            pending: BTreeMap::new(),
            activations: Vec::new(),
            rmng_rgate,
            rmng_children: BTreeMap::new(),
            root_exit: None,
            next_act: 1,
            // the root quotas use the tile ids and the default id
            next_quota: 0x1000,
            next_req: 1,
            next_srv: 1,
        }
    }

    pub fn alloc_act_id(&mut self) -> ActId {
        let id = self.next_act;
        self.next_act += 1;
        id
    }

    pub fn alloc_quota_id(&mut self) -> quota::Id {
        let id = self.next_quota;
        self.next_quota += 1;
        id
    }

    pub fn alloc_req_id(&mut self) -> Label {
        let id = self.next_req;
        self.next_req = self.next_req.wrapping_add(1).max(1);
        id
    }

    pub fn alloc_srv_id(&mut self) -> u64 {
        let id = self.next_srv;
        self.next_srv += 1;
        id
    }

    pub fn root_exit(&self) -> Option<Code> {
        self.root_exit
    }

    pub fn set_root_exit(&mut self, code: Code) {
        self.root_exit = Some(code);
    }

    pub fn act(&self, id: ActId) -> Result<&Activity, Error> {
        self.acts.get(&id).ok_or_else(|| Error::new(Code::ActivityGone))
    }

    pub fn act_mut(&mut self, id: ActId) -> Result<&mut Activity, Error> {
        self.acts
            .get_mut(&id)
            .ok_or_else(|| Error::new(Code::ActivityGone))
    }

    pub fn kobj(&self, act: ActId, sel: CapSel) -> Option<KObject> {
        self.caps.obj(act, sel).cloned()
    }

    fn charge(&self, act: ActId, size: usize) -> Result<(), Error> {
        let kmem = self.act(act)?.kmem();
        if !kmem.alloc(size) {
            log!(
                LogFlags::KernMem,
                "Activity {} has insufficient kernel memory for {} bytes",
                act,
                size
            );
            return Err(Error::new(Code::NoKernMem));
        }
        Ok(())
    }

    fn refund(&self, act: ActId, size: usize) {
        if let Some(a) = self.acts.get(&act) {
            a.kmem().free(size);
        }
    }

    /// Inserts a root capability for `obj` into the table of `act` and charges its kernel memory
    pub fn insert_cap(&mut self, act: ActId, sel: CapSel, obj: KObject) -> Result<(), Error> {
        let size = CAP_SIZE + obj.size();
        self.charge(act, size)?;
        if let Err(e) = self.caps.insert(act, sel, obj) {
            self.refund(act, size);
            return Err(e);
        }
        Ok(())
    }

    /// Inserts a capability for the new object `obj` as a child of `parent`
    pub fn insert_child_cap(
        &mut self,
        act: ActId,
        sel: CapSel,
        obj: KObject,
        parent: CapRef,
    ) -> Result<(), Error> {
        let size = CAP_SIZE + obj.size();
        self.charge(act, size)?;
        if let Err(e) = self.caps.insert_as_child(act, sel, obj, parent) {
            self.refund(act, size);
            return Err(e);
        }
        Ok(())
    }

    /// Copies the capability `src` to `dst`
    pub fn clone_cap(&mut self, dst: CapRef, src: CapRef) -> Result<(), Error> {
        self.charge(dst.act, CAP_SIZE)?;
        if let Err(e) = self.caps.clone_cap(dst, src) {
            self.refund(dst.act, CAP_SIZE);
            return Err(e);
        }
        Ok(())
    }

    /// Revokes the capabilities `crd` of `act` and releases the objects behind them
    pub fn revoke(&mut self, act: ActId, crd: CapRngDesc, own: bool) -> Result<(), Error> {
        let released = self.caps.revoke(act, crd, own)?;
        self.release_all(released);
        Ok(())
    }

    /// Unbinds the gate of `ep` and returns it
    ///
    /// If the gate is a receive gate, the send EPs of all its send gates are invalidated as well,
    /// so that waiting senders notice that nobody will reply.
    pub fn deconfigure_ep(&self, ep: &EPObject) -> Option<GateObject> {
        let gate = ep.deconfigure()?;
        if let GateObject::Recv(ref rgate) = gate {
            for sgate in rgate.senders() {
                if let Some(sep) = sgate.gate_ep().get_ep() {
                    log!(
                        LogFlags::KernEPs,
                        "Receive gate of {}:EP{} is gone, invalidating sender {}:EP{}",
                        ep.tile_id(),
                        ep.ep(),
                        sep.tile_id(),
                        sep.ep()
                    );
                    ktcu::invalidate_ep_remote(&self.machine, sep.tile_id(), sep.ep(), true).ok();
                    sep.deconfigure();
                }
            }
        }
        Some(gate)
    }

    pub fn release_all(&mut self, caps: Released) {
        for (act, cap) in caps {
            self.release(act, cap);
        }
    }

    fn release(&mut self, act: ActId, cap: Capability) {
        let obj = cap.get().clone();
        let derived = cap.is_derived();
        self.refund(act, if derived { CAP_SIZE } else { CAP_SIZE + obj.size() });

        match obj {
            KObject::Activity(id) => {
                // the capability of the creator owns the activity
                if !derived && id != act {
                    tiles::remove_activity(self, id);
                }
            },

            KObject::RGate(_) | KObject::SGate(_) | KObject::MGate(_) => {
                if let Some(ep) = obj.to_gate().and_then(|g| g.gate_ep().get_ep()) {
                    if !derived || ep.activity() == act {
                        ktcu::invalidate_ep_remote(&self.machine, ep.tile_id(), ep.ep(), true).ok();
                        self.deconfigure_ep(&ep);
                    }
                }
            },

            KObject::EP(ep) if !derived => {
                if self.deconfigure_ep(&ep).is_some() {
                    ktcu::invalidate_ep_remote(&self.machine, ep.tile_id(), ep.ep(), true).ok();
                }
                let count = 1 + ep.replies();
                self.tiles.free_eps(ep.tile_id(), ep.ep(), count);
                ep.quota().free(count);
            },

            KObject::Serv(s) if !derived => {
                let srv = s.service().clone();
                log!(LogFlags::KernServ, "Removing service {:?}", srv);
                if self
                    .services
                    .get(srv.name())
                    .map(|o| Rc::ptr_eq(o, &srv))
                    .unwrap_or(false)
                {
                    self.services.remove(srv.name());
                }
                com::abort_service(self, &srv);
            },

            KObject::Sess(s) => {
                let srv = s.service().clone();
                let given_by_owner = cap.parent().map(|p| p.act) == Some(srv.owner());
                let registered = self
                    .services
                    .get(srv.name())
                    .map(|o| Rc::ptr_eq(o, &srv))
                    .unwrap_or(false);
                if given_by_owner && act != srv.owner() && registered {
                    let mut msg = MsgBuf::new();
                    build_vmsg!(msg, service::Request::Close { sid: s.ident() });
                    com::send_request(self, msg, PendingOp::Close { srv }).ok();
                }
            },

            KObject::Sem(s) if !derived => {
                for waiter in s.revoke() {
                    if let Some(msg) = self.acts.get_mut(&waiter).and_then(|a| a.take_sem_wait()) {
                        reply_code(ktcu::KSYS_EP, msg, Code::RecvGone);
                    }
                }
            },

            KObject::KMem(k) if !derived => k.revoke(),

            KObject::Tile(t) if !derived => {
                if t.derived() {
                    t.revoke();
                }
                else {
                    self.tiles.set_allocated(t.tile(), false);
                }
            },

            _ => {},
        }
    }
}

/// Replies `code` to `msg`, which has been received on `ep`
pub fn reply_code(ep: EpId, msg: &'static Message, code: Code) {
    let mut rep = MsgBuf::new();
    build_vmsg!(rep, kif::DefaultReply { error: code });
    ktcu::reply(ep, &rep, msg).ok();
}
