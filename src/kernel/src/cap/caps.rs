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

use base::col::{BTreeMap, Vec};
use base::errors::{Code, Error};
use base::io::LogFlags;
use base::kif::{CapRngDesc, CapSel};
use base::log;
use base::tcu::ActId;

use core::fmt;

use crate::cap::KObject;

/// The kernel memory that is charged for each capability
pub const CAP_SIZE: usize = 128;

/// Refers to a capability by its owning activity and selector
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CapRef {
    pub act: ActId,
    pub sel: CapSel,
}

impl CapRef {
    pub fn new(act: ActId, sel: CapSel) -> Self {
        Self { act, sel }
    }
}

/// A capability, which is a node in the capability tree
///
/// The tree spans all capability tables: exchanging a capability creates a child in the table of
/// the receiver and revoking a capability revokes all of its descendants.
pub struct Capability {
    sel: CapSel,
    obj: KObject,
    parent: Option<CapRef>,
    children: Vec<CapRef>,
    derived: bool,
}

impl Capability {
    fn new(sel: CapSel, obj: KObject, parent: Option<CapRef>, derived: bool) -> Self {
        Self {
            sel,
            obj,
            parent,
            children: Vec::new(),
            derived,
        }
    }

    pub fn sel(&self) -> CapSel {
        self.sel
    }

    pub fn get(&self) -> &KObject {
        &self.obj
    }

    pub fn parent(&self) -> Option<CapRef> {
        self.parent
    }

    pub fn children(&self) -> &[CapRef] {
        &self.children
    }

    /// Returns whether the capability has been exchanged, that is, it does not own its object
    pub fn is_derived(&self) -> bool {
        self.derived
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cap[sel={}, obj={:?}, parent={:?}, childs={}, derived={}]",
            self.sel,
            self.obj,
            self.parent,
            self.children.len(),
            self.derived
        )
    }
}

#[derive(Default)]
pub struct CapTable {
    caps: BTreeMap<CapSel, Capability>,
}

impl CapTable {
    pub fn is_empty(&self) -> bool {
        self.caps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.caps.len()
    }

    pub fn get(&self, sel: CapSel) -> Option<&Capability> {
        self.caps.get(&sel)
    }

    pub fn unused(&self, sel: CapSel) -> bool {
        !self.caps.contains_key(&sel)
    }

    pub fn range_unused(&self, crd: &CapRngDesc) -> bool {
        self.caps.range(crd.start()..crd.end()).next().is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.caps.values()
    }
}

/// The capability tables of all activities
#[derive(Default)]
pub struct CapSpace {
    tables: BTreeMap<ActId, CapTable>,
}

/// The capabilities that have been removed by a revoke, in the order they should be released
pub type Released = Vec<(ActId, Capability)>;

impl CapSpace {
    pub fn add_table(&mut self, act: ActId) {
        self.tables.entry(act).or_default();
    }

    /// Removes the table of `act`, which needs to be empty
    pub fn remove_table(&mut self, act: ActId) {
        if let Some(tbl) = self.tables.remove(&act) {
            debug_assert!(tbl.is_empty());
        }
    }

    pub fn table(&self, act: ActId) -> Option<&CapTable> {
        self.tables.get(&act)
    }

    pub fn get(&self, act: ActId, sel: CapSel) -> Option<&Capability> {
        self.tables.get(&act)?.get(sel)
    }

    pub fn obj(&self, act: ActId, sel: CapSel) -> Option<&KObject> {
        self.get(act, sel).map(|c| c.get())
    }

    pub fn unused(&self, act: ActId, sel: CapSel) -> bool {
        self.tables.get(&act).map(|t| t.unused(sel)).unwrap_or(false)
    }

    pub fn range_unused(&self, act: ActId, crd: &CapRngDesc) -> bool {
        self.tables
            .get(&act)
            .map(|t| t.range_unused(crd))
            .unwrap_or(false)
    }

    /// Inserts a new root capability for `obj` at `sel` in the table of `act`
    pub fn insert(&mut self, act: ActId, sel: CapSel, obj: KObject) -> Result<(), Error> {
        self.insert_cap(CapRef::new(act, sel), Capability::new(sel, obj, None, false))
    }

    /// Inserts a new capability for `obj` as a child of `parent`
    ///
    /// The new capability owns its object (e.g., a derived memory gate), in contrast to
    /// [`clone_cap`](Self::clone_cap).
    pub fn insert_as_child(
        &mut self,
        act: ActId,
        sel: CapSel,
        obj: KObject,
        parent: CapRef,
    ) -> Result<(), Error> {
        if self.get(parent.act, parent.sel).is_none() {
            return Err(Error::new(Code::InvArgs));
        }
        let cap = CapRef::new(act, sel);
        self.insert_cap(cap, Capability::new(sel, obj, Some(parent), false))?;
        self.add_child(parent, cap);
        Ok(())
    }

    /// Creates a copy of the capability `src` at `dst`, which becomes a child of `src`
    pub fn clone_cap(&mut self, dst: CapRef, src: CapRef) -> Result<(), Error> {
        let obj = self
            .obj(src.act, src.sel)
            .cloned()
            .ok_or_else(|| Error::new(Code::InvArgs))?;
        self.insert_cap(dst, Capability::new(dst.sel, obj, Some(src), true))?;
        self.add_child(src, dst);
        log!(LogFlags::KernCaps, "Cloned cap {:?} to {:?}", src, dst);
        Ok(())
    }

    fn insert_cap(&mut self, at: CapRef, cap: Capability) -> Result<(), Error> {
        let tbl = self
            .tables
            .get_mut(&at.act)
            .ok_or_else(|| Error::new(Code::InvArgs))?;
        if !tbl.unused(at.sel) {
            return Err(Error::new(Code::Exists));
        }
        log!(LogFlags::KernCaps, "Creating cap {}:{:?}", at.act, cap);
        tbl.caps.insert(at.sel, cap);
        Ok(())
    }

    fn add_child(&mut self, parent: CapRef, child: CapRef) {
        if let Some(p) = self
            .tables
            .get_mut(&parent.act)
            .and_then(|t| t.caps.get_mut(&parent.sel))
        {
            p.children.push(child);
        }
    }

    /// Revokes the capabilities in `crd` of `act`
    ///
    /// With `own`, the capabilities are removed themselves; otherwise only their descendants. The
    /// removed capabilities are returned in the order they should be released: descendants before
    /// their ancestors.
    pub fn revoke(&mut self, act: ActId, crd: CapRngDesc, own: bool) -> Result<Released, Error> {
        let tbl = self
            .tables
            .get(&act)
            .ok_or_else(|| Error::new(Code::InvArgs))?;
        let sels: Vec<CapSel> = tbl.caps.range(crd.start()..crd.end()).map(|(s, _)| *s).collect();
        if let Some(cap) = sels
            .iter()
            .filter_map(|s| tbl.get(*s))
            .find(|c| !c.obj.can_revoke())
        {
            log!(LogFlags::KernCaps, "Cap {:?} is not revocable", cap);
            return Err(Error::new(Code::NotRevocable));
        }

        let mut res = Vec::new();
        for sel in sels {
            let cap = CapRef::new(act, sel);
            if own {
                self.detach(cap);
                self.remove_rec(cap, &mut res);
            }
            else if let Some(c) = self
                .tables
                .get_mut(&act)
                .and_then(|t| t.caps.get_mut(&sel))
            {
                let children = core::mem::take(&mut c.children);
                for child in children {
                    self.remove_rec(child, &mut res);
                }
            }
        }
        Ok(res)
    }

    /// Revokes all capabilities of `act`
    pub fn revoke_all(&mut self, act: ActId) -> Released {
        let mut res = Vec::new();
        // start with the highest selector to release the capabilities in reverse creation order
        while let Some(sel) = self
            .tables
            .get(&act)
            .and_then(|t| t.caps.keys().next_back().copied())
        {
            let cap = CapRef::new(act, sel);
            self.detach(cap);
            self.remove_rec(cap, &mut res);
        }
        res
    }

    fn detach(&mut self, cap: CapRef) {
        let parent = self.get(cap.act, cap.sel).and_then(|c| c.parent);
        if let Some(p) = parent {
            if let Some(pcap) = self.tables.get_mut(&p.act).and_then(|t| t.caps.get_mut(&p.sel)) {
                pcap.children.retain(|c| *c != cap);
            }
        }
    }

    fn remove_rec(&mut self, cap: CapRef, res: &mut Released) {
        let removed = self
            .tables
            .get_mut(&cap.act)
            .and_then(|t| t.caps.remove(&cap.sel));
        if let Some(mut c) = removed {
            let children = core::mem::take(&mut c.children);
            for child in children {
                self.remove_rec(child, res);
            }
            log!(LogFlags::KernCaps, "Revoked cap {}:{:?}", cap.act, c);
            res.push((cap.act, c));
        }
    }
}

impl fmt::Debug for CapSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (act, tbl) in &self.tables {
            writeln!(f, "CapTable[act={}]:", act)?;
            for cap in tbl.iter() {
                writeln!(f, "  {:?}", cap)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use base::kif::CapType;

    use crate::cap::{KMemObject, SemObject};

    fn sem() -> KObject {
        KObject::Sem(SemObject::new(0))
    }

    fn crd(start: CapSel, count: CapSel) -> CapRngDesc {
        CapRngDesc::new(CapType::Object, start, count)
    }

    fn sels(res: &Released) -> Vec<(ActId, CapSel)> {
        res.iter().map(|(a, c)| (*a, c.sel())).collect()
    }

    fn space() -> CapSpace {
        let mut space = CapSpace::default();
        space.add_table(1);
        space.add_table(2);
        space.add_table(3);
        space
    }

    #[test]
    fn insert_and_exists() {
        let mut space = space();
        assert!(space.insert(1, 5, sem()).is_ok());
        assert_eq!(space.insert(1, 5, sem()).err(), Some(Error::new(Code::Exists)));
        assert!(!space.unused(1, 5));
        assert!(space.unused(1, 6));
        assert!(!space.range_unused(1, &crd(4, 2)));
        assert!(space.range_unused(1, &crd(6, 10)));
        // unknown activities have no free selectors
        assert!(!space.unused(9, 5));
        assert_eq!(space.insert(9, 5, sem()).err(), Some(Error::new(Code::InvArgs)));
    }

    #[test]
    fn revoke_children_first() {
        let mut space = space();
        space.insert(1, 3, sem()).unwrap();
        space.clone_cap(CapRef::new(2, 10), CapRef::new(1, 3)).unwrap();
        space.clone_cap(CapRef::new(3, 20), CapRef::new(2, 10)).unwrap();
        space.clone_cap(CapRef::new(3, 21), CapRef::new(1, 3)).unwrap();
        assert!(space.get(2, 10).unwrap().is_derived());
        assert!(!space.get(1, 3).unwrap().is_derived());

        let res = space.revoke(1, crd(3, 1), true).unwrap();
        assert_eq!(sels(&res), vec![(3, 20), (2, 10), (3, 21), (1, 3)]);
        assert!(space.unused(1, 3) && space.unused(2, 10) && space.unused(3, 20));
        assert!(space.unused(3, 21));
    }

    #[test]
    fn revoke_only_children() {
        let mut space = space();
        space.insert(1, 3, sem()).unwrap();
        space.clone_cap(CapRef::new(2, 10), CapRef::new(1, 3)).unwrap();
        space.clone_cap(CapRef::new(3, 20), CapRef::new(2, 10)).unwrap();

        let res = space.revoke(1, crd(3, 1), false).unwrap();
        assert_eq!(sels(&res), vec![(3, 20), (2, 10)]);
        let cap = space.get(1, 3).unwrap();
        assert!(cap.children().is_empty());
    }

    #[test]
    fn revoke_detaches_from_parent() {
        let mut space = space();
        space.insert(1, 3, sem()).unwrap();
        space.clone_cap(CapRef::new(2, 10), CapRef::new(1, 3)).unwrap();
        space.clone_cap(CapRef::new(2, 11), CapRef::new(1, 3)).unwrap();

        let res = space.revoke(2, crd(10, 1), true).unwrap();
        assert_eq!(sels(&res), vec![(2, 10)]);
        assert_eq!(space.get(1, 3).unwrap().children(), &[CapRef::new(2, 11)]);

        // revoking the parent still finds the remaining child
        let res = space.revoke(1, crd(3, 1), true).unwrap();
        assert_eq!(sels(&res), vec![(2, 11), (1, 3)]);
    }

    #[test]
    fn revoke_ranges() {
        let mut space = space();
        for sel in 4..8 {
            space.insert(1, sel, sem()).unwrap();
        }
        let res = space.revoke(1, crd(5, 2), true).unwrap();
        assert_eq!(sels(&res), vec![(1, 5), (1, 6)]);
        assert!(!space.unused(1, 4) && !space.unused(1, 7));
        // empty ranges are fine
        assert!(space.revoke(1, crd(100, 5), true).unwrap().is_empty());
    }

    #[test]
    fn not_revocable() {
        let mut space = space();
        let kmem = KMemObject::new(2, 0x1000);
        space.insert(1, 4, KObject::KMem(kmem.clone())).unwrap();
        assert!(kmem.alloc(0x100));
        assert_eq!(
            space.revoke(1, crd(4, 1), true).err(),
            Some(Error::new(Code::NotRevocable))
        );
        assert!(!space.unused(1, 4));

        kmem.free(0x100);
        assert_eq!(sels(&space.revoke(1, crd(4, 1), true).unwrap()), vec![(1, 4)]);
    }

    #[test]
    fn revoke_all() {
        let mut space = space();
        space.insert(1, 0, sem()).unwrap();
        space.insert(1, 1, sem()).unwrap();
        space.insert(2, 7, sem()).unwrap();
        space.clone_cap(CapRef::new(1, 2), CapRef::new(2, 7)).unwrap();
        space.clone_cap(CapRef::new(3, 4), CapRef::new(1, 1)).unwrap();

        let res = space.revoke_all(1);
        assert_eq!(sels(&res), vec![(1, 2), (3, 4), (1, 1), (1, 0)]);
        assert!(space.table(1).unwrap().is_empty());
        assert!(space.get(2, 7).unwrap().children().is_empty());
        assert!(space.unused(3, 4));
        space.remove_table(1);
        assert!(space.table(1).is_none());
    }

    #[test]
    fn children_of_owned_objects() {
        let mut space = space();
        space.insert(1, 3, sem()).unwrap();
        space
            .insert_as_child(2, 8, sem(), CapRef::new(1, 3))
            .unwrap();
        assert!(!space.get(2, 8).unwrap().is_derived());
        assert_eq!(space.get(2, 8).unwrap().parent(), Some(CapRef::new(1, 3)));
        assert_eq!(
            space
                .insert_as_child(2, 9, sem(), CapRef::new(1, 4))
                .err(),
            Some(Error::new(Code::InvArgs))
        );
        let res = space.revoke(1, crd(3, 1), true).unwrap();
        assert_eq!(sels(&res), vec![(2, 8), (1, 3)]);
    }
}
