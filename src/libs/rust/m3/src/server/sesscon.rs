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

use crate::col::Vec;
use crate::errors::{Code, Error};

/// Used as session identifier
pub type SessId = usize;

/// The maximum number of sessions a container can hold
pub const MAX_SESSIONS: usize = 64;

/// A container for sessions.
pub struct SessionContainer<S> {
    con: Vec<Option<S>>,
    used: u64,
}

impl<S> SessionContainer<S> {
    /// Creates a new `SessionContainer` with at most `capacity` sessions.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_SESSIONS);
        let mut con = Vec::with_capacity(capacity);
        con.resize_with(capacity, || None);
        SessionContainer { con, used: 0 }
    }

    /// Returns the maximum number of sessions
    pub fn capacity(&self) -> usize {
        self.con.len()
    }

    /// Returns the number of sessions
    pub fn len(&self) -> usize {
        self.used.count_ones() as usize
    }

    /// Returns true if there are no sessions
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Returns the id that will be used for the next session
    pub fn next_id(&self) -> Result<SessId, Error> {
        (0..self.con.len())
            .find(|i| self.used & (1 << i) == 0)
            .ok_or_else(|| Error::new(Code::NoSpace))
    }

    /// Returns a reference to the session with given id
    pub fn get(&self, sid: SessId) -> Option<&S> {
        self.con.get(sid).and_then(|s| s.as_ref())
    }

    /// Returns a mutable reference to the session with given id
    pub fn get_mut(&mut self, sid: SessId) -> Option<&mut S> {
        self.con.get_mut(sid).and_then(|s| s.as_mut())
    }

    /// Iterates over all sessions and calls `func` on each session.
    pub fn for_each<F>(&mut self, mut func: F)
    where
        F: FnMut(SessId, &mut S),
    {
        for (sid, sess) in self.con.iter_mut().enumerate() {
            if let Some(s) = sess {
                func(sid, s);
            }
        }
    }

    /// Adds `sess` with given id
    pub fn add(&mut self, sid: SessId, sess: S) -> Result<(), Error> {
        if sid >= self.con.len() {
            return Err(Error::new(Code::InvArgs));
        }
        if self.used & (1 << sid) != 0 {
            return Err(Error::new(Code::Exists));
        }

        self.con[sid] = Some(sess);
        self.used |= 1 << sid;
        Ok(())
    }

    /// Removes the session with given id and returns it
    pub fn remove(&mut self, sid: SessId) -> Option<S> {
        if sid < self.con.len() && (self.used & (1 << sid)) != 0 {
            self.used &= !(1 << sid);
            self.con[sid].take()
        }
        else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_reused() {
        let mut sc = SessionContainer::new(3);
        assert_eq!(sc.next_id(), Ok(0));
        sc.add(0, "a").unwrap();
        sc.add(1, "b").unwrap();
        assert_eq!(sc.next_id(), Ok(2));

        assert_eq!(sc.remove(0), Some("a"));
        assert_eq!(sc.remove(0), None);
        assert_eq!(sc.next_id(), Ok(0));
        assert_eq!(sc.len(), 1);
        assert_eq!(sc.get(1), Some(&"b"));
    }

    #[test]
    fn limits() {
        let mut sc = SessionContainer::new(1);
        sc.add(0, 1).unwrap();
        assert_eq!(sc.next_id().unwrap_err().code(), Code::NoSpace);
        assert_eq!(sc.add(0, 2).unwrap_err().code(), Code::Exists);
        assert_eq!(sc.add(1, 2).unwrap_err().code(), Code::InvArgs);
        assert!(sc.get(5).is_none());

        let big = SessionContainer::<u8>::new(1000);
        assert_eq!(big.capacity(), MAX_SESSIONS);
    }

    #[test]
    fn iterate() {
        let mut sc = SessionContainer::new(8);
        sc.add(2, 20).unwrap();
        sc.add(5, 50).unwrap();

        let mut seen = Vec::new();
        sc.for_each(|sid, s| {
            *s += 1;
            seen.push((sid, *s));
        });
        assert_eq!(seen, [(2, 21), (5, 51)]);
    }
}
