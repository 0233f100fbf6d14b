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

//! The endpoint model
//!
//! Each endpoint consists of [`EP_REGS`](super::EP_REGS) registers. The first register determines
//! the type of the endpoint and the owning activity; the remaining bits depend on the type:
//!
//! ```text
//! SEND     r0: type | act << 3 | cur_crd << 19 | max_crd << 25 | msg_order << 31
//!                   | flags << 37 | crd_ep << 39
//!          r1: dst_ep | dst_tile << 16
//!          r2: label
//! RECEIVE  r0: type | act << 3 | reply_eps << 19 | slots_order << 35 | msg_order << 41
//!                   | rpos << 47 | wpos << 53
//!          r1: buffer address
//!          r2: occupied | unread << 32
//! MEMORY   r0: type | act << 3 | perm << 19 | tile << 23
//!          r1: address
//!          r2: size
//! ```

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::errors::{Code, Error};
use crate::kif::Perm;
use crate::mem::GlobOff;
use crate::tcu::{ActId, EpId, Label, Reg, TileId, EP_REGS, NO_REPLIES, UNLIM_CREDITS};

/// The different endpoint types
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum EpType {
    /// Invalid endpoint (unusable)
    Invalid,
    /// Send endpoint
    Send,
    /// Receive endpoint
    Receive,
    /// Memory endpoint
    Memory,
}

impl EpType {
    /// Returns the type of the endpoint with given registers
    pub fn of(regs: &[Reg; EP_REGS]) -> Self {
        Self::try_from(regs[0] & 0x7).unwrap_or(Self::Invalid)
    }
}

bitflags! {
    /// The flags of send endpoints
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct SendFlags : Reg {
        /// The endpoint has been installed by the TCU to send a single reply
        const REPLY = 1 << 0;
    }
}

fn bits(reg: Reg, shift: u32, width: u32) -> Reg {
    (reg >> shift) & ((1 << width) - 1)
}

/// A decoded send endpoint
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SendEp {
    pub act: ActId,
    pub cur_crd: u32,
    pub max_crd: u32,
    pub msg_order: u32,
    pub flags: SendFlags,
    /// For reply endpoints: the send endpoint at the receiver of the reply that gets the credit
    pub crd_ep: EpId,
    pub tile: TileId,
    pub dst_ep: EpId,
    pub label: Label,
}

impl SendEp {
    /// Decodes the given registers, returning `None` if they do not describe a send endpoint
    pub fn from_regs(regs: &[Reg; EP_REGS]) -> Option<Self> {
        if EpType::of(regs) != EpType::Send {
            return None;
        }
        Some(Self {
            act: bits(regs[0], 3, 16) as ActId,
            cur_crd: bits(regs[0], 19, 6) as u32,
            max_crd: bits(regs[0], 25, 6) as u32,
            msg_order: bits(regs[0], 31, 6) as u32,
            flags: SendFlags::from_bits_truncate(bits(regs[0], 37, 2)),
            crd_ep: bits(regs[0], 39, 16) as EpId,
            tile: TileId::new_from_raw(bits(regs[1], 16, 16) as u16),
            dst_ep: bits(regs[1], 0, 16) as EpId,
            label: regs[2] as Label,
        })
    }

    /// Encodes the endpoint into registers
    pub fn to_regs(&self) -> [Reg; EP_REGS] {
        [
            EpType::Send as Reg
                | (self.act as Reg) << 3
                | (self.cur_crd as Reg) << 19
                | (self.max_crd as Reg) << 25
                | (self.msg_order as Reg) << 31
                | self.flags.bits() << 37
                | (self.crd_ep as Reg) << 39,
            self.dst_ep as Reg | (self.tile.raw() as Reg) << 16,
            self.label as Reg,
        ]
    }

    /// Returns true if the endpoint has unlimited credits
    pub fn unlimited(&self) -> bool {
        self.max_crd == UNLIM_CREDITS
    }

    /// Consumes a credit for a message of `size` bytes (including the header)
    ///
    /// # Errors
    ///
    /// Fails with [`SendInvMsgSize`](Code::SendInvMsgSize) if the message is larger than the
    /// configured message size and with [`MissCredits`](Code::MissCredits) if no credits are left.
    pub fn take_credit(&mut self, size: usize) -> Result<(), Error> {
        if size > (1 << self.msg_order) {
            return Err(Error::new(Code::SendInvMsgSize));
        }
        if !self.unlimited() {
            if self.cur_crd == 0 {
                return Err(Error::new(Code::MissCredits));
            }
            self.cur_crd -= 1;
        }
        Ok(())
    }

    /// Returns a credit to the endpoint
    ///
    /// Returns false if the credit was dropped, because the endpoint has all of its credits.
    pub fn refill(&mut self) -> bool {
        if self.unlimited() || self.cur_crd >= self.max_crd {
            return false;
        }
        self.cur_crd += 1;
        true
    }
}

/// A decoded receive endpoint with its ring buffer state
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RecvEp {
    pub act: ActId,
    pub reply_eps: Option<EpId>,
    pub slots_order: u32,
    pub msg_order: u32,
    pub rpos: u32,
    pub wpos: u32,
    pub buffer: GlobOff,
    pub occupied: u32,
    pub unread: u32,
}

impl RecvEp {
    /// Decodes the given registers, returning `None` if they do not describe a receive endpoint
    pub fn from_regs(regs: &[Reg; EP_REGS]) -> Option<Self> {
        if EpType::of(regs) != EpType::Receive {
            return None;
        }
        let reply_eps = bits(regs[0], 19, 16) as EpId;
        Some(Self {
            act: bits(regs[0], 3, 16) as ActId,
            reply_eps: if reply_eps == NO_REPLIES {
                None
            }
            else {
                Some(reply_eps)
            },
            slots_order: bits(regs[0], 35, 6) as u32,
            msg_order: bits(regs[0], 41, 6) as u32,
            rpos: bits(regs[0], 47, 6) as u32,
            wpos: bits(regs[0], 53, 6) as u32,
            buffer: regs[1],
            occupied: regs[2] as u32,
            unread: (regs[2] >> 32) as u32,
        })
    }

    /// Encodes the endpoint into registers
    pub fn to_regs(&self) -> [Reg; EP_REGS] {
        [
            EpType::Receive as Reg
                | (self.act as Reg) << 3
                | (self.reply_eps.unwrap_or(NO_REPLIES) as Reg) << 19
                | (self.slots_order as Reg) << 35
                | (self.msg_order as Reg) << 41
                | (self.rpos as Reg) << 47
                | (self.wpos as Reg) << 53,
            self.buffer,
            self.occupied as Reg | (self.unread as Reg) << 32,
        ]
    }

    /// Returns the number of slots
    pub fn slots(&self) -> usize {
        1 << self.slots_order
    }

    /// Returns the number of unread messages
    pub fn unread_count(&self) -> u32 {
        self.unread.count_ones()
    }

    /// Returns the offset of the given slot within the buffer
    pub fn slot_offset(&self, slot: usize) -> usize {
        slot << self.msg_order
    }

    /// Returns the slot for the given offset within the buffer, if it is a valid slot offset
    pub fn offset_slot(&self, off: usize) -> Option<usize> {
        let slot = off >> self.msg_order;
        if (off & ((1 << self.msg_order) - 1)) != 0 || slot >= self.slots() {
            return None;
        }
        Some(slot)
    }

    /// Searches for a free slot, starting at the write position and wrapping around
    pub fn find_free_slot(&self) -> Option<usize> {
        let slots = self.slots();
        (0..slots)
            .map(|i| (self.wpos as usize + i) % slots)
            .find(|s| self.occupied & (1 << s) == 0)
    }

    /// Marks `slot` as occupied and unread and advances the write position behind it
    pub fn occupy(&mut self, slot: usize) {
        debug_assert!(self.occupied & (1 << slot) == 0);
        self.occupied |= 1 << slot;
        self.unread |= 1 << slot;
        self.wpos = ((slot + 1) % self.slots()) as u32;
    }

    /// Fetches the next unread message, starting at the read position and wrapping around
    ///
    /// Returns the offset of the message within the buffer. The slot stays occupied until it is
    /// acknowledged.
    pub fn fetch(&mut self) -> Option<usize> {
        let slots = self.slots();
        let slot = (0..slots)
            .map(|i| (self.rpos as usize + i) % slots)
            .find(|s| self.unread & (1 << s) != 0)?;
        self.unread &= !(1 << slot);
        self.rpos = ((slot + 1) % slots) as u32;
        Some(self.slot_offset(slot))
    }

    /// Frees the slot at offset `off`
    ///
    /// # Errors
    ///
    /// Fails with [`InvMsgOff`](Code::InvMsgOff) if the offset does not refer to an occupied slot.
    pub fn ack(&mut self, off: usize) -> Result<usize, Error> {
        let slot = self.offset_slot(off).ok_or_else(|| Error::new(Code::InvMsgOff))?;
        if self.occupied & (1 << slot) == 0 {
            return Err(Error::new(Code::InvMsgOff));
        }
        self.occupied &= !(1 << slot);
        self.unread &= !(1 << slot);
        Ok(slot)
    }
}

/// A decoded memory endpoint
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemEp {
    pub act: ActId,
    pub perm: Perm,
    pub tile: TileId,
    pub addr: GlobOff,
    pub size: GlobOff,
}

impl MemEp {
    /// Decodes the given registers, returning `None` if they do not describe a memory endpoint
    pub fn from_regs(regs: &[Reg; EP_REGS]) -> Option<Self> {
        if EpType::of(regs) != EpType::Memory {
            return None;
        }
        Some(Self {
            act: bits(regs[0], 3, 16) as ActId,
            perm: Perm::from_bits_truncate(bits(regs[0], 19, 4) as u32),
            tile: TileId::new_from_raw(bits(regs[0], 23, 16) as u16),
            addr: regs[1],
            size: regs[2],
        })
    }

    /// Encodes the endpoint into registers
    pub fn to_regs(&self) -> [Reg; EP_REGS] {
        [
            EpType::Memory as Reg
                | (self.act as Reg) << 3
                | (self.perm.bits() as Reg) << 19
                | (self.tile.raw() as Reg) << 23,
            self.addr,
            self.size,
        ]
    }

    /// Checks whether an access of `size` bytes at `off` with permission `perm` is allowed
    pub fn check_access(&self, off: GlobOff, size: usize, perm: Perm) -> Result<(), Error> {
        if !self.perm.contains(perm) {
            return Err(Error::new(Code::NoPerm));
        }
        match off.checked_add(size as GlobOff) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(Error::new(Code::OutOfBounds)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recv_ep(slots_order: u32) -> RecvEp {
        RecvEp {
            act: 1,
            reply_eps: None,
            slots_order,
            msg_order: 6,
            rpos: 0,
            wpos: 0,
            buffer: 0x1000,
            occupied: 0,
            unread: 0,
        }
    }

    #[test]
    fn send_regs() {
        let ep = SendEp {
            act: 3,
            cur_crd: 2,
            max_crd: 4,
            msg_order: 8,
            flags: SendFlags::REPLY,
            crd_ep: 17,
            tile: TileId::new(0, 5),
            dst_ep: 40,
            label: 0xDEAD_BEEF,
        };
        let regs = ep.to_regs();
        assert_eq!(regs[0] & 0x7, EpType::Send as Reg);
        assert_eq!((regs[0] >> 19) & 0x3F, 2);
        assert_eq!((regs[0] >> 25) & 0x3F, 4);
        assert_eq!(regs[1], 40 | 5 << 16);
        assert_eq!(SendEp::from_regs(&regs), Some(ep));
        assert_eq!(RecvEp::from_regs(&regs), None);
        assert_eq!(MemEp::from_regs(&regs), None);
    }

    #[test]
    fn credits() {
        let mut ep = SendEp::from_regs(
            &SendEp {
                act: 0,
                cur_crd: 2,
                max_crd: 2,
                msg_order: 6,
                flags: SendFlags::empty(),
                crd_ep: 0,
                tile: TileId::default(),
                dst_ep: 0,
                label: 0,
            }
            .to_regs(),
        )
        .unwrap();

        assert_eq!(ep.take_credit(128).err(), Some(Error::new(Code::SendInvMsgSize)));
        assert!(ep.take_credit(64).is_ok());
        assert!(ep.take_credit(16).is_ok());
        assert_eq!(ep.cur_crd, 0);
        assert_eq!(ep.take_credit(16).err(), Some(Error::new(Code::MissCredits)));
        assert!(ep.refill());
        assert!(ep.refill());
        // never exceeds the maximum
        assert!(!ep.refill());
        assert_eq!(ep.cur_crd, ep.max_crd);

        ep.max_crd = UNLIM_CREDITS;
        ep.cur_crd = UNLIM_CREDITS;
        for _ in 0..100 {
            assert!(ep.take_credit(16).is_ok());
        }
        assert_eq!(ep.cur_crd, UNLIM_CREDITS);
    }

    #[test]
    fn ring_scan_order() {
        let mut ep = recv_ep(2);

        // fill all four slots in order
        for i in 0..4 {
            let slot = ep.find_free_slot().unwrap();
            assert_eq!(slot, i);
            ep.occupy(slot);
        }
        assert_eq!(ep.find_free_slot(), None);
        assert_eq!(ep.unread_count(), 4);

        // fetch the first two and ack the second
        assert_eq!(ep.fetch(), Some(0));
        assert_eq!(ep.fetch(), Some(64));
        assert_eq!(ep.ack(64), Ok(1));
        assert_eq!(ep.unread_count(), 2);
        assert_eq!(ep.occupied.count_ones(), 3);

        // the write position wrapped, so that the next free slot is found at index 1
        assert_eq!(ep.find_free_slot(), Some(1));
        ep.occupy(1);

        // reading continues at the read position and wraps around to slot 1
        assert_eq!(ep.fetch(), Some(128));
        assert_eq!(ep.fetch(), Some(192));
        assert_eq!(ep.fetch(), Some(64));
        assert_eq!(ep.fetch(), None);
        assert_eq!(RecvEp::from_regs(&ep.to_regs()), Some(ep));
    }

    #[test]
    fn ring_invariants() {
        let mut ep = recv_ep(5);
        for round in 0..100usize {
            if round % 3 != 2 {
                if let Some(slot) = ep.find_free_slot() {
                    ep.occupy(slot);
                }
            }
            else if let Some(off) = ep.fetch() {
                ep.ack(off).unwrap();
            }
            assert_eq!(ep.unread & !ep.occupied, 0);
            assert!(ep.unread_count() <= ep.occupied.count_ones());
            assert!(ep.occupied.count_ones() as usize <= ep.slots());
        }
    }

    #[test]
    fn ack_errors() {
        let mut ep = recv_ep(2);
        assert_eq!(ep.ack(0).err(), Some(Error::new(Code::InvMsgOff)));
        ep.occupy(0);
        assert_eq!(ep.ack(3).err(), Some(Error::new(Code::InvMsgOff)));
        assert_eq!(ep.ack(256).err(), Some(Error::new(Code::InvMsgOff)));
        assert_eq!(ep.ack(0), Ok(0));
    }

    #[test]
    fn mem_access() {
        let ep = MemEp {
            act: 0,
            perm: Perm::R,
            tile: TileId::new(0, 2),
            addr: 0x1000,
            size: 4096,
        };
        assert_eq!(MemEp::from_regs(&ep.to_regs()), Some(ep));
        assert!(ep.check_access(0, 4096, Perm::R).is_ok());
        assert_eq!(ep.check_access(1, 4096, Perm::R).err(), Some(Error::new(Code::OutOfBounds)));
        assert_eq!(ep.check_access(0, 1, Perm::W).err(), Some(Error::new(Code::NoPerm)));
        assert_eq!(
            ep.check_access(!0, 2, Perm::R).err(),
            Some(Error::new(Code::OutOfBounds))
        );
    }
}
