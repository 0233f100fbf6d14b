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

use num_enum::{FromPrimitive, IntoPrimitive};

use crate::serialize::{Deserialize, Serialize};

/// A capability selector
pub type CapSel = u64;

/// The capability types
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, FromPrimitive)]
#[repr(u64)]
pub enum CapType {
    /// Object capabilities are used for kernel objects (SendGate, Activity, ...)
    #[default]
    Object,
    /// Mapping capabilities are used for page table entries
    Mapping,
}

/// A capability range descriptor, which describes a continuous range of capabilities
///
/// The descriptor is packed into a single word:
///
/// +-------------------+-------------+------+
/// |      start        |    count    | type |
/// +-------------------+-------------+------+
/// 64                 33             1      0
#[derive(Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapRngDesc(u64);

impl CapRngDesc {
    const COUNT_BITS: u32 = 32;
    const START_BITS: u32 = 31;

    /// Creates a new capability range descriptor. `start` is the first capability selector and
    /// `start + count - 1` is the last one.
    pub fn new(ty: CapType, start: CapSel, count: CapSel) -> CapRngDesc {
        assert!(start < (1 << Self::START_BITS) && count < (1 << Self::COUNT_BITS));
        CapRngDesc(start << (Self::COUNT_BITS + 1) | count << 1 | u64::from(ty))
    }

    /// Creates a new capability range descriptor from the given raw value
    pub fn new_from(raw: u64) -> CapRngDesc {
        CapRngDesc(raw)
    }

    /// Returns the raw value
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Returns the capability type
    pub fn cap_type(self) -> CapType {
        CapType::from(self.0 & 0x1)
    }

    /// Returns the first capability selector
    pub fn start(self) -> CapSel {
        self.0 >> (Self::COUNT_BITS + 1)
    }

    /// Returns the number of capability selectors
    pub fn count(self) -> CapSel {
        (self.0 >> 1) & ((1 << Self::COUNT_BITS) - 1)
    }

    /// Returns the end of the range (exclusive)
    pub fn end(self) -> CapSel {
        self.start() + self.count()
    }

    /// Returns true if `sel` is within this range
    pub fn contains(self, sel: CapSel) -> bool {
        sel >= self.start() && sel < self.end()
    }
}

impl fmt::Debug for CapRngDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for CapRngDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CRD[{:?}: {}:{}]",
            self.cap_type(),
            self.start(),
            self.count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing() {
        let crd = CapRngDesc::new(CapType::Object, 5, 3);
        assert_eq!(crd.raw(), 5 << 33 | 3 << 1);
        assert_eq!(crd.cap_type(), CapType::Object);
        assert_eq!(crd.start(), 5);
        assert_eq!(crd.count(), 3);
        assert_eq!(crd.end(), 8);
        assert!(crd.contains(7) && !crd.contains(8) && !crd.contains(4));

        let crd = CapRngDesc::new(CapType::Mapping, (1 << 31) - 1, (1 << 32) - 1);
        assert_eq!(crd.cap_type(), CapType::Mapping);
        assert_eq!(crd.start(), (1 << 31) - 1);
        assert_eq!(crd.count(), (1 << 32) - 1);
        assert_eq!(crd.raw(), !0);

        assert_eq!(CapRngDesc::new_from(crd.raw()), crd);
    }

    #[test]
    #[should_panic]
    fn start_overflow() {
        CapRngDesc::new(CapType::Object, 1 << 31, 1);
    }
}
