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

use base::cell::{Cell, RefCell};
use base::col::{Vec, VecDeque};
use base::kif::{Perm, TileDesc};
use base::mem::{size_of, GlobOff};
use base::quota;
use base::rc::{Rc, Weak};
use base::tcu::{ActId, EpId, Label, TileId};

use core::cmp;
use core::fmt;

use crate::com::Service;
use crate::mem::Allocation;

/// The kernel objects capabilities refer to
#[derive(Clone)]
pub enum KObject {
    RGate(Rc<RGateObject>),
    SGate(Rc<SGateObject>),
    MGate(Rc<MGateObject>),
    Serv(Rc<ServObject>),
    Sess(Rc<SessObject>),
    Sem(Rc<SemObject>),
    // the activities are owned by the kernel; the capability only names them
    Activity(ActId),
    KMem(Rc<KMemObject>),
    Tile(Rc<TileObject>),
    EP(Rc<EPObject>),
}

const fn kobj_size<T>() -> usize {
    let size = size_of::<T>();
    if size <= 64 {
        64
    }
    else if size <= 128 {
        128
    }
    else {
        size + 64
    }
}

/// The kernel memory that is charged for each activity
pub const ACT_SIZE: usize = 4096;

impl KObject {
    /// Returns the kernel memory that is charged for this object
    pub fn size(&self) -> usize {
        match self {
            KObject::RGate(_) => kobj_size::<RGateObject>(),
            KObject::SGate(_) => kobj_size::<SGateObject>(),
            KObject::MGate(_) => kobj_size::<MGateObject>(),
            KObject::Serv(_) => kobj_size::<ServObject>(),
            KObject::Sess(_) => kobj_size::<SessObject>(),
            KObject::Sem(_) => kobj_size::<SemObject>(),
            KObject::Activity(_) => ACT_SIZE,
            KObject::KMem(_) => kobj_size::<KMemObject>(),
            // assume pessimistically that each TileObject has its own EPQuota
            KObject::Tile(_) => kobj_size::<TileObject>() + kobj_size::<EPQuota>(),
            KObject::EP(_) => kobj_size::<EPObject>(),
        }
    }

    /// Returns whether a capability for this object can currently be revoked
    pub fn can_revoke(&self) -> bool {
        match self {
            KObject::KMem(k) => k.left() == k.quota(),
            KObject::Tile(t) => t.activities() == 0,
            _ => true,
        }
    }

    /// Returns the gate behind this object, if it is one
    pub fn to_gate(&self) -> Option<GateObject> {
        match self {
            KObject::MGate(g) => Some(GateObject::Mem(g.clone())),
            KObject::RGate(g) => Some(GateObject::Recv(g.clone())),
            KObject::SGate(g) => Some(GateObject::Send(g.clone())),
            _ => None,
        }
    }
}

impl fmt::Debug for KObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KObject::SGate(s) => write!(f, "{:?}", s),
            KObject::RGate(r) => write!(f, "{:?}", r),
            KObject::MGate(m) => write!(f, "{:?}", m),
            KObject::Serv(s) => write!(f, "{:?}", s),
            KObject::Sess(s) => write!(f, "{:?}", s),
            KObject::Activity(id) => write!(f, "Activity[id={}]", id),
            KObject::Sem(s) => write!(f, "{:?}", s),
            KObject::KMem(k) => write!(f, "{:?}", k),
            KObject::Tile(t) => write!(f, "{:?}", t),
            KObject::EP(e) => write!(f, "{:?}", e),
        }
    }
}

/// The binding of a gate to an endpoint
pub struct GateEP {
    ep: RefCell<Weak<EPObject>>,
}

impl GateEP {
    fn new() -> Self {
        Self {
            ep: RefCell::new(Weak::new()),
        }
    }

    pub fn get_ep(&self) -> Option<Rc<EPObject>> {
        self.ep.borrow().upgrade()
    }

    pub fn set_ep(&self, o: &Rc<EPObject>) {
        self.ep.replace(Rc::downgrade(o));
    }

    pub fn remove_ep(&self) {
        self.ep.replace(Weak::new());
    }
}

#[derive(Clone)]
pub enum GateObject {
    Recv(Rc<RGateObject>),
    Send(Rc<SGateObject>),
    Mem(Rc<MGateObject>),
}

impl GateObject {
    pub fn gate_ep(&self) -> &GateEP {
        match self {
            Self::Recv(g) => &g.gep,
            Self::Send(g) => &g.gep,
            Self::Mem(g) => &g.gep,
        }
    }
}

pub struct RGateObject {
    gep: GateEP,
    loc: Cell<Option<(TileId, EpId)>>,
    addr: Cell<GlobOff>,
    order: u32,
    msg_order: u32,
    senders: RefCell<Vec<Weak<SGateObject>>>,
}

impl RGateObject {
    pub fn new(order: u32, msg_order: u32) -> Rc<Self> {
        Rc::new(Self {
            gep: GateEP::new(),
            loc: Cell::new(None),
            addr: Cell::new(0),
            order,
            msg_order,
            senders: RefCell::new(Vec::new()),
        })
    }

    pub fn gate_ep(&self) -> &GateEP {
        &self.gep
    }

    /// Returns the send gates that are still alive and forgets the others
    pub fn senders(&self) -> Vec<Rc<SGateObject>> {
        let mut senders = self.senders.borrow_mut();
        senders.retain(|s| s.strong_count() > 0);
        senders.iter().filter_map(Weak::upgrade).collect()
    }

    pub fn location(&self) -> Option<(TileId, EpId)> {
        self.loc.get()
    }

    pub fn addr(&self) -> GlobOff {
        self.addr.get()
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn msg_order(&self) -> u32 {
        self.msg_order
    }

    pub fn slots(&self) -> u32 {
        1 << (self.order - self.msg_order)
    }

    pub fn activated(&self) -> bool {
        self.loc.get().is_some()
    }

    pub fn activate(&self, tile: TileId, ep: EpId, addr: GlobOff) {
        self.loc.replace(Some((tile, ep)));
        self.addr.replace(addr);
    }

    pub fn deactivate(&self) {
        self.addr.set(0);
        self.loc.set(None);
    }
}

impl fmt::Debug for RGateObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RGate[loc={:?}, addr={:#x}, sz={:#x}, msz={:#x}]",
            self.loc.get(),
            self.addr.get(),
            1u64 << self.order,
            1u64 << self.msg_order
        )
    }
}

pub struct SGateObject {
    gep: GateEP,
    rgate: Rc<RGateObject>,
    label: Label,
    credits: u32,
}

impl SGateObject {
    pub fn new(rgate: &Rc<RGateObject>, label: Label, credits: u32) -> Rc<Self> {
        let sgate = Rc::new(Self {
            gep: GateEP::new(),
            rgate: rgate.clone(),
            label,
            credits,
        });
        rgate.senders.borrow_mut().push(Rc::downgrade(&sgate));
        sgate
    }

    pub fn gate_ep(&self) -> &GateEP {
        &self.gep
    }

    pub fn rgate(&self) -> &Rc<RGateObject> {
        &self.rgate
    }

    pub fn label(&self) -> Label {
        self.label
    }

    pub fn credits(&self) -> u32 {
        self.credits
    }
}

impl fmt::Debug for SGateObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SGate[rgate={:?}, lbl={:#x}, crd={}]",
            self.rgate, self.label, self.credits
        )
    }
}

pub struct MGateObject {
    gep: GateEP,
    tile: TileId,
    addr: GlobOff,
    size: GlobOff,
    perms: Perm,
    // the memory that is freed when the last capability is revoked
    mem: Option<Allocation>,
}

impl MGateObject {
    pub fn new(tile: TileId, addr: GlobOff, size: GlobOff, perms: Perm) -> Rc<Self> {
        Rc::new(Self {
            gep: GateEP::new(),
            tile,
            addr,
            size,
            perms,
            mem: None,
        })
    }

    pub fn new_owned(mem: Allocation, perms: Perm) -> Rc<Self> {
        Rc::new(Self {
            gep: GateEP::new(),
            tile: mem.tile(),
            addr: mem.addr(),
            size: mem.size(),
            perms,
            mem: Some(mem),
        })
    }

    pub fn gate_ep(&self) -> &GateEP {
        &self.gep
    }

    pub fn tile_id(&self) -> TileId {
        self.tile
    }

    pub fn addr(&self) -> GlobOff {
        self.addr
    }

    pub fn size(&self) -> GlobOff {
        self.size
    }

    pub fn perms(&self) -> Perm {
        self.perms
    }

    pub fn allocation(&self) -> Option<&Allocation> {
        self.mem.as_ref()
    }
}

impl fmt::Debug for MGateObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MGate[tile={}, addr={:#x}, size={:#x}, perm={:?}, owned={}]",
            self.tile,
            self.addr,
            self.size,
            self.perms,
            self.mem.is_some()
        )
    }
}

pub struct ServObject {
    serv: Rc<Service>,
}

impl ServObject {
    pub fn new(serv: Rc<Service>) -> Rc<Self> {
        Rc::new(Self { serv })
    }

    pub fn service(&self) -> &Rc<Service> {
        &self.serv
    }
}

impl fmt::Debug for ServObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Serv[srv={:?}]", self.serv)
    }
}

pub struct SessObject {
    serv: Rc<Service>,
    ident: u64,
}

impl SessObject {
    pub fn new(serv: &Rc<Service>, ident: u64) -> Rc<Self> {
        Rc::new(Self {
            serv: serv.clone(),
            ident,
        })
    }

    pub fn service(&self) -> &Rc<Service> {
        &self.serv
    }

    pub fn ident(&self) -> u64 {
        self.ident
    }
}

impl fmt::Debug for SessObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sess[srv={}, ident={:#x}]", self.serv.name(), self.ident)
    }
}

pub struct SemObject {
    counter: Cell<u32>,
    waiters: RefCell<VecDeque<ActId>>,
}

impl SemObject {
    pub fn new(counter: u32) -> Rc<Self> {
        Rc::new(Self {
            counter: Cell::new(counter),
            waiters: RefCell::new(VecDeque::new()),
        })
    }

    pub fn counter(&self) -> u32 {
        self.counter.get()
    }

    /// Tries to decrement the counter. If it is zero, `act` is enqueued and false is returned.
    pub fn down(&self, act: ActId) -> bool {
        match self.counter.get() {
            0 => {
                self.waiters.borrow_mut().push_back(act);
                false
            },
            c => {
                self.counter.set(c - 1);
                true
            },
        }
    }

    /// Increments the counter or hands the unit to the first waiter, which is returned
    pub fn up(&self) -> Option<ActId> {
        let waiter = self.waiters.borrow_mut().pop_front();
        if waiter.is_none() {
            self.counter.set(self.counter.get() + 1);
        }
        waiter
    }

    /// Removes all waiters and returns them
    pub fn revoke(&self) -> VecDeque<ActId> {
        self.waiters.replace(VecDeque::new())
    }
}

impl fmt::Debug for SemObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sem[counter={}, waiters={}]",
            self.counter.get(),
            self.waiters.borrow().len()
        )
    }
}

/// The endpoint budget of a tile
pub struct EPQuota {
    id: quota::Id,
    total: u32,
    left: Cell<u32>,
}

impl EPQuota {
    pub fn new(id: quota::Id, eps: u32) -> Rc<Self> {
        Rc::new(Self {
            id,
            total: eps,
            left: Cell::new(eps),
        })
    }

    pub fn id(&self) -> quota::Id {
        self.id
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn left(&self) -> u32 {
        self.left.get()
    }
}

pub struct TileObject {
    tile: TileId,
    desc: TileDesc,
    eps: Rc<EPQuota>,
    activities: Cell<u32>,
    parent: Option<Rc<TileObject>>,
}

impl TileObject {
    pub fn new(tile: TileId, desc: TileDesc, eps: Rc<EPQuota>) -> Rc<Self> {
        Rc::new(Self {
            tile,
            desc,
            eps,
            activities: Cell::new(0),
            parent: None,
        })
    }

    /// Derives a new tile object that either shares our endpoint quota (`eps` = None) or gets a
    /// new quota with `eps` endpoints taken from ours.
    pub fn derive(self: &Rc<Self>, quota_id: quota::Id, eps: Option<u32>) -> Option<Rc<Self>> {
        let quota = match eps {
            Some(n) => {
                if !self.has_quota(n) {
                    return None;
                }
                self.alloc(n);
                EPQuota::new(quota_id, n)
            },
            None => self.eps.clone(),
        };
        Some(Rc::new(Self {
            tile: self.tile,
            desc: self.desc,
            eps: quota,
            activities: Cell::new(0),
            parent: Some(self.clone()),
        }))
    }

    pub fn tile(&self) -> TileId {
        self.tile
    }

    pub fn desc(&self) -> TileDesc {
        self.desc
    }

    pub fn derived(&self) -> bool {
        self.parent.is_some()
    }

    pub fn ep_quota(&self) -> &Rc<EPQuota> {
        &self.eps
    }

    pub fn activities(&self) -> u32 {
        self.activities.get()
    }

    pub fn has_quota(&self, eps: u32) -> bool {
        self.eps.left() >= eps
    }

    pub fn add_activity(&self) {
        self.activities.set(self.activities() + 1);
    }

    pub fn rem_activity(&self) {
        self.activities.set(self.activities() - 1);
    }

    pub fn alloc(&self, eps: u32) {
        debug_assert!(self.has_quota(eps));
        self.eps.left.set(self.eps.left() - eps);
    }

    pub fn free(&self, eps: u32) {
        let left = self.eps.left() + eps;
        self.eps.left.set(cmp::min(left, self.eps.total()));
    }

    /// Gives the endpoints of this derived tile object back to its parent
    pub fn revoke(&self) {
        if let Some(ref parent) = self.parent {
            // a shared quota has never been taken from the parent
            if !Rc::ptr_eq(&self.eps, &parent.eps) {
                parent.free(self.eps.total());
            }
        }
    }
}

impl fmt::Debug for TileObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tile[id={}, eps={} of {} (quota {}), acts={}, derived={}]",
            self.tile,
            self.eps.left(),
            self.eps.total(),
            self.eps.id(),
            self.activities(),
            self.derived()
        )
    }
}

pub struct EPObject {
    gate: RefCell<Option<GateObject>>,
    act: ActId,
    tile: TileId,
    ep: EpId,
    replies: u32,
    // the tile object whose quota the endpoints were taken from
    quota: Rc<TileObject>,
}

impl EPObject {
    pub fn new(
        act: ActId,
        tile: TileId,
        ep: EpId,
        replies: u32,
        quota: &Rc<TileObject>,
    ) -> Rc<Self> {
        Rc::new(Self {
            gate: RefCell::new(None),
            act,
            tile,
            ep,
            replies,
            quota: quota.clone(),
        })
    }

    pub fn tile_id(&self) -> TileId {
        self.tile
    }

    pub fn activity(&self) -> ActId {
        self.act
    }

    pub fn ep(&self) -> EpId {
        self.ep
    }

    pub fn replies(&self) -> u32 {
        self.replies
    }

    pub fn quota(&self) -> &Rc<TileObject> {
        &self.quota
    }

    pub fn gate(&self) -> Option<GateObject> {
        self.gate.borrow().clone()
    }

    /// Binds this endpoint to the given gate
    pub fn configure(ep: &Rc<Self>, gate: GateObject) {
        gate.gate_ep().set_ep(ep);
        ep.gate.replace(Some(gate));
    }

    /// Unbinds the gate from this endpoint and returns it
    pub fn deconfigure(&self) -> Option<GateObject> {
        let gate = self.gate.replace(None);
        if let Some(ref g) = gate {
            g.gate_ep().remove_ep();
            if let GateObject::Recv(r) = g {
                r.deactivate();
            }
        }
        gate
    }
}

impl fmt::Debug for EPObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EPMask[act={}, tile={}, ep={}, replies={}]",
            self.act, self.tile, self.ep, self.replies
        )
    }
}

pub struct KMemObject {
    id: quota::Id,
    quota: usize,
    left: Cell<usize>,
    parent: Option<Rc<KMemObject>>,
}

impl KMemObject {
    pub fn new(id: quota::Id, quota: usize) -> Rc<Self> {
        Rc::new(Self {
            id,
            quota,
            left: Cell::new(quota),
            parent: None,
        })
    }

    /// Takes `quota` bytes from this object and hands them to a new child object
    pub fn derive(self: &Rc<Self>, id: quota::Id, quota: usize) -> Option<Rc<Self>> {
        if !self.alloc(quota) {
            return None;
        }
        Some(Rc::new(Self {
            id,
            quota,
            left: Cell::new(quota),
            parent: Some(self.clone()),
        }))
    }

    pub fn id(&self) -> quota::Id {
        self.id
    }

    pub fn quota(&self) -> usize {
        self.quota
    }

    pub fn left(&self) -> usize {
        self.left.get()
    }

    pub fn has_quota(&self, size: usize) -> bool {
        self.left() >= size
    }

    pub fn alloc(&self, size: usize) -> bool {
        if !self.has_quota(size) {
            return false;
        }
        self.left.set(self.left() - size);
        true
    }

    pub fn free(&self, size: usize) {
        let left = self.left() + size;
        self.left.set(cmp::min(left, self.quota));
    }

    /// Gives the quota of this derived object back to its parent
    pub fn revoke(&self) {
        if let Some(ref parent) = self.parent {
            parent.free(self.quota);
        }
    }
}

impl fmt::Debug for KMemObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "KMem[id={}, quota={:#x}, left={:#x}]",
            self.id,
            self.quota,
            self.left()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use base::kif::{TileISA, TileType};

    #[test]
    fn kmem_quota_returns_to_parent() {
        let root = KMemObject::new(1, 0x4000);
        let child = root.derive(2, 0x1000).unwrap();
        assert_eq!(root.left(), 0x3000);
        assert!(root.derive(3, 0x4000).is_none());

        assert!(child.alloc(0x800));
        assert!(!child.alloc(0x1000));
        child.free(0x800);
        child.revoke();
        assert_eq!(root.left(), 0x4000);
    }

    #[test]
    fn tile_quota_shared_or_split() {
        let desc = TileDesc::new(TileType::Comp, TileISA::X86, 0);
        let tile = TileObject::new(TileId::new(0, 1), desc, EPQuota::new(1, 16));

        let shared = tile.derive(2, None).unwrap();
        shared.alloc(4);
        assert_eq!(tile.ep_quota().left(), 12);
        shared.free(4);
        shared.revoke();
        assert_eq!(tile.ep_quota().left(), 16);

        let split = tile.derive(3, Some(10)).unwrap();
        assert!(split.derived());
        assert_eq!(tile.ep_quota().left(), 6);
        assert_eq!(split.ep_quota().total(), 10);
        assert!(tile.derive(4, Some(7)).is_none());
        split.revoke();
        assert_eq!(tile.ep_quota().left(), 16);
    }

    #[test]
    fn sem_waiters_in_order() {
        let sem = SemObject::new(1);
        assert!(sem.down(1));
        assert!(!sem.down(2));
        assert!(!sem.down(3));
        assert_eq!(sem.up(), Some(2));
        assert_eq!(sem.revoke().len(), 1);
        assert_eq!(sem.up(), None);
        assert_eq!(sem.counter(), 1);
    }
}
