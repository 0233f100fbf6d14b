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

use core::cell::{Cell, RefCell};

use crate::cap::Selector;
use crate::col::Vec;

/// The capability selector space of an activity
///
/// New selectors are handed out from a watermark. Single selectors that have been revoked are
/// put on a free list and reused before the watermark is moved.
#[derive(Debug)]
pub struct SelSpace {
    next: Cell<Selector>,
    free: RefCell<Vec<Selector>>,
}

impl SelSpace {
    /// Creates a new selector space that starts at `first`
    pub fn new(first: Selector) -> Self {
        Self {
            next: Cell::new(first),
            free: RefCell::new(Vec::new()),
        }
    }

    /// Returns the next selector above the watermark
    pub fn next_sel(&self) -> Selector {
        self.next.get()
    }

    /// Allocates a single selector
    pub fn alloc_sel(&self) -> Selector {
        if let Some(sel) = self.free.borrow_mut().pop() {
            return sel;
        }
        self.alloc_sels(1)
    }

    /// Allocates `count` contiguous selectors and returns the first one
    pub fn alloc_sels(&self, count: u64) -> Selector {
        let sel = self.next.get();
        self.next.set(sel + count);
        sel
    }

    /// Puts `sel` back on the free list
    ///
    /// Freeing a selector that is not allocated is a bug and panics in debug builds.
    pub fn free_sel(&self, sel: Selector) {
        debug_assert!(
            sel < self.next.get() && !self.free.borrow().contains(&sel),
            "selector {} is not allocated",
            sel
        );
        if sel + 1 == self.next.get() {
            self.next.set(sel);
        }
        else {
            self.free.borrow_mut().push(sel);
        }
    }

    /// Moves the watermark to `sel`, if it is below
    pub fn ensure_above(&self, sel: Selector) {
        if self.next.get() < sel {
            self.next.set(sel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watermark() {
        let space = SelSpace::new(4);
        assert_eq!(space.alloc_sel(), 4);
        assert_eq!(space.alloc_sels(3), 5);
        assert_eq!(space.alloc_sel(), 8);
        assert_eq!(space.next_sel(), 9);
    }

    #[test]
    fn reuse_freed() {
        let space = SelSpace::new(10);
        let a = space.alloc_sel();
        let b = space.alloc_sel();
        let c = space.alloc_sel();
        space.free_sel(b);
        assert_eq!(space.alloc_sel(), b);

        // freeing the topmost selector lowers the watermark
        space.free_sel(c);
        assert_eq!(space.next_sel(), c);
        assert_eq!(space.alloc_sel(), c);
        assert!(a < b && b < c);
    }

    #[test]
    #[should_panic]
    #[cfg(debug_assertions)]
    fn double_free() {
        let space = SelSpace::new(10);
        let b = space.alloc_sel();
        space.alloc_sel();
        space.free_sel(b);
        space.free_sel(b);
    }

    #[test]
    #[should_panic]
    #[cfg(debug_assertions)]
    fn free_above_watermark() {
        let space = SelSpace::new(10);
        space.free_sel(10);
    }

    #[test]
    fn ensure_above() {
        let space = SelSpace::new(4);
        space.free_sel(2);
        space.ensure_above(20);
        assert_eq!(space.alloc_sels(1), 20);
        // the free list is still used for single selectors
        assert_eq!(space.alloc_sel(), 2);
        space.ensure_above(5);
        assert_eq!(space.next_sel(), 21);
    }
}
