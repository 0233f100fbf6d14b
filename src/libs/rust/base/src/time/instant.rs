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
use core::ops::{Add, Sub};

use crate::tcu::TCU;
use crate::time::TimeDuration;

/// A measurement of time, represented in nanoseconds since boot, as reported by the TCU.
// inspired by std::time::Instant
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeInstant(u64);

impl TimeInstant {
    /// Returns an instant corresponding to "now".
    pub fn now() -> Self {
        Self::from_nanos(TCU::nanotime())
    }

    /// Creates a new time instant from the given number of nanoseconds.
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Returns the time instant in nanoseconds
    pub fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Returns the amount of time elapsed from another instant to this one, or None if that instant
    /// is later than this one.
    pub fn checked_duration_since(&self, earlier: Self) -> Option<TimeDuration> {
        self.0.checked_sub(earlier.0).map(TimeDuration::from_nanos)
    }

    /// Returns the amount of time elapsed from another instant to this one, or zero if that
    /// instant is later than this one.
    pub fn duration_since(&self, earlier: Self) -> TimeDuration {
        self.checked_duration_since(earlier).unwrap_or_default()
    }

    /// Returns the amount of time elapsed since this instant was created.
    pub fn elapsed(&self) -> TimeDuration {
        Self::now().duration_since(*self)
    }
}

impl Add<TimeDuration> for TimeInstant {
    type Output = TimeInstant;

    fn add(self, other: TimeDuration) -> TimeInstant {
        Self::from_nanos(self.0.saturating_add(other.as_nanos() as u64))
    }
}

impl Sub<TimeInstant> for TimeInstant {
    type Output = TimeDuration;

    fn sub(self, other: TimeInstant) -> TimeDuration {
        self.duration_since(other)
    }
}

impl fmt::Debug for TimeInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ns", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = TimeInstant::from_nanos(1000);
        let b = a + TimeDuration::from_nanos(500);
        assert_eq!(b.as_nanos(), 1500);
        assert_eq!(b - a, TimeDuration::from_nanos(500));
        assert_eq!(a.checked_duration_since(b), None);
        assert_eq!(a - b, TimeDuration::ZERO);
    }
}
