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

//! The single-threaded cooperative workloop
//!
//! A [`WorkLoop`] holds a list of work items. Every pass calls each item once; an item reports
//! whether it did any work (e.g., handled a message). If no item did, the activity sleeps until
//! the next event arrives. The pending events are fetched at the start of each pass, so that the
//! sleep only returns for new ones. Receive gates attach themselves as work items via
//! [`RecvGate::start`](crate::com::RecvGate::start).

use core::fmt;

use crate::cell::{Cell, RefCell};
use crate::col::Vec;
use crate::errors::Error;
use crate::io::LogFlags;
use crate::log;
use crate::rc::Rc;
use crate::tcu::TCU;
use crate::tiles::OwnActivity;

/// Identifies a work item within its [`WorkLoop`]
pub type ItemId = u64;

/// A work item, returning true if it did some work
pub type WorkItem = Rc<dyn Fn() -> Result<bool, Error>>;

/// A list of work items that are polled until the loop is stopped
#[derive(Default)]
pub struct WorkLoop {
    items: RefCell<Vec<(ItemId, WorkItem)>>,
    next_id: Cell<ItemId>,
    stopped: Cell<bool>,
}

impl WorkLoop {
    /// Creates an empty workloop
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the given item and returns its id
    pub fn add(&self, item: WorkItem) -> ItemId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.items.borrow_mut().push((id, item));
        log!(LogFlags::LibWorkLoop, "workloop: added item {}", id);
        id
    }

    /// Removes the item with given id, if present
    pub fn remove(&self, id: ItemId) {
        self.items.borrow_mut().retain(|(iid, _)| *iid != id);
        log!(LogFlags::LibWorkLoop, "workloop: removed item {}", id);
    }

    /// Returns true if there is at least one item
    pub fn has_items(&self) -> bool {
        !self.items.borrow().is_empty()
    }

    /// Returns true if [`stop`](WorkLoop::stop) has been called since the last start
    pub fn is_stopped(&self) -> bool {
        self.stopped.get()
    }

    /// Lets [`run`](WorkLoop::run) return before the next pass
    pub fn stop(&self) {
        log!(LogFlags::LibWorkLoop, "workloop: stopping");
        self.stopped.set(true);
    }

    /// Calls every item once and returns true if any item did some work
    ///
    /// Items can add or remove items while being called; the changes take effect in the next
    /// pass.
    pub fn tick(&self) -> Result<bool, Error> {
        let items: Vec<WorkItem> = self
            .items
            .borrow()
            .iter()
            .map(|(_, it)| it.clone())
            .collect();

        let mut worked = false;
        for it in items {
            if self.stopped.get() {
                break;
            }
            worked |= it()?;
        }
        Ok(worked)
    }

    /// Runs the loop until it is stopped or no items are left
    pub fn run(&self) -> Result<(), Error> {
        self.stopped.set(false);
        while !self.stopped.get() && self.has_items() {
            TCU::fetch_events();
            if !self.tick()? && !self.stopped.get() {
                OwnActivity::sleep()?;
            }
        }
        log!(LogFlags::LibWorkLoop, "workloop: done");
        Ok(())
    }
}

impl fmt::Debug for WorkLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WorkLoop[items: {}, stopped: {}]",
            self.items.borrow().len(),
            self.stopped.get()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::errors::Code;

    #[test]
    fn tick_reports_work() {
        let wl = WorkLoop::new();
        assert!(!wl.tick().unwrap());

        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let id = wl.add(Rc::new(move || {
            c.set(c.get() + 1);
            Ok(c.get() < 3)
        }));
        wl.add(Rc::new(|| Ok(false)));

        assert!(wl.tick().unwrap());
        assert!(wl.tick().unwrap());
        assert!(!wl.tick().unwrap());
        assert_eq!(count.get(), 3);

        wl.remove(id);
        assert!(wl.has_items());
        assert!(!wl.tick().unwrap());
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn stop_skips_remaining_items() {
        let wl = Rc::new(WorkLoop::new());
        let called = Rc::new(Cell::new(false));

        let wl2 = Rc::downgrade(&wl);
        wl.add(Rc::new(move || {
            if let Some(wl) = wl2.upgrade() {
                wl.stop();
            }
            Ok(true)
        }));
        let c = called.clone();
        wl.add(Rc::new(move || {
            c.set(true);
            Ok(true)
        }));

        // stops before sleeping, so that no activity is needed
        wl.run().unwrap();
        assert!(wl.is_stopped());
        assert!(!called.get());
    }

    #[test]
    fn item_errors_abort_the_pass() {
        let wl = WorkLoop::new();
        wl.add(Rc::new(|| Err(Error::new(Code::InvArgs))));
        assert_eq!(wl.tick().unwrap_err().code(), Code::InvArgs);
    }

    #[test]
    fn items_added_during_pass() {
        let wl = Rc::new(WorkLoop::new());
        let wl2 = Rc::downgrade(&wl);
        wl.add(Rc::new(move || {
            if let Some(wl) = wl2.upgrade() {
                wl.add(Rc::new(|| Ok(false)));
            }
            Ok(false)
        }));

        wl.tick().unwrap();
        assert_eq!(wl.items.borrow().len(), 2);
    }
}
