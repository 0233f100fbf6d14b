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

use bitflags::bitflags;

use core::fmt;
use core::ptr;
use core::slice;

use crate::const_assert;
use crate::tcu::{EpId, Label, TileId};

bitflags! {
    /// The flags in the message header
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct HeaderFlags : u32 {
        /// The message is a reply
        const REPLY         = 1 << 0;
        /// The message is a page fault message
        const PAGEFAULT     = 1 << 1;
        /// The reply could not be delivered
        const REPLY_FAILED  = 1 << 2;
    }
}

/// The TCU header
///
/// The first word packs the flags, the reply size, the sender tile, and the payload length:
///
/// ```text
/// +--------+-------------+------------+-------+
/// | length | sender tile | reply size | flags |
/// +--------+-------------+------------+-------+
/// 32       19            7            3       0
/// ```
#[repr(C, packed)]
#[derive(Copy, Clone, Default)]
pub struct Header {
    other: u32,
    sender_ep: u16,
    reply_ep: u16,
    reply_label: Label,
    label: Label,
}

const_assert!(core::mem::size_of::<Header>() == 16);

impl Header {
    /// The maximum payload length that can be represented
    pub const MAX_LENGTH: usize = (1 << 13) - 1;

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        flags: HeaderFlags,
        reply_size: u32,
        sender_tile: TileId,
        sender_ep: EpId,
        reply_ep: EpId,
        length: usize,
        reply_label: Label,
        label: Label,
    ) -> Self {
        debug_assert!(length <= Self::MAX_LENGTH);
        let tile = ((sender_tile.chip() as u32 & 0xF) << 8) | sender_tile.tile() as u32;
        Self {
            other: flags.bits() | (reply_size & 0xF) << 3 | tile << 7 | (length as u32) << 19,
            sender_ep,
            reply_ep,
            reply_label,
            label,
        }
    }

    /// Returns the flags of the message
    pub fn flags(&self) -> HeaderFlags {
        HeaderFlags::from_bits_truncate(self.other & 0x7)
    }

    /// Returns the message size order that replies to this message may use
    pub fn reply_size(&self) -> u32 {
        (self.other >> 3) & 0xF
    }

    /// Returns the tile of the sender
    pub fn sender_tile(&self) -> TileId {
        let tile = (self.other >> 7) & 0xFFF;
        TileId::new((tile >> 8) as u8, tile as u8)
    }

    /// Returns the send endpoint of the sender
    pub fn sender_ep(&self) -> EpId {
        self.sender_ep
    }

    /// Returns the receive endpoint the reply is delivered to
    pub fn reply_ep(&self) -> EpId {
        self.reply_ep
    }

    /// Returns the length of the message payload in bytes
    pub fn length(&self) -> usize {
        (self.other >> 19) as usize & Self::MAX_LENGTH
    }

    /// Returns the label that will be used for the reply
    pub fn reply_label(&self) -> Label {
        self.reply_label
    }

    /// Returns the label that has been assigned to the sender of the message
    pub fn label(&self) -> Label {
        self.label
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Header[flags={:?}, sender={}:{}, reply_ep={}, len={}, rlbl={:#x}, lbl={:#x}]",
            self.flags(),
            self.sender_tile(),
            self.sender_ep(),
            self.reply_ep(),
            self.length(),
            self.reply_label(),
            self.label(),
        )
    }
}

/// The TCU message consisting of the header and the payload
#[repr(C, align(8))]
#[derive(Debug)]
pub struct Message {
    pub header: Header,
    pub data: [u8],
}

impl Message {
    /// Creates a message reference for the message at the given address
    ///
    /// # Safety
    ///
    /// The address needs to point to a valid header, followed by the payload, which stays valid
    /// for the lifetime `'a`.
    pub unsafe fn from_addr<'a>(addr: usize) -> &'a Message {
        let head = addr as *const Header;
        let len = (*head).length();
        &*(ptr::slice_from_raw_parts(addr as *const u8, len) as *const Message)
    }

    /// Returns the address of the message (i.e., its header)
    pub fn addr(&self) -> usize {
        self as *const Message as *const u8 as usize
    }

    /// Returns the message data as a slice of u64's
    pub fn as_words(&self) -> &[u64] {
        // safety: messages are 8-byte aligned and the TCU writes full words
        unsafe {
            let ptr = self.data.as_ptr() as *const u64;
            slice::from_raw_parts(ptr, self.header.length() / 8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::util;

    #[test]
    fn header_layout() {
        let hd = Header::new(
            HeaderFlags::REPLY,
            6,
            TileId::new(1, 0x23),
            17,
            4,
            440,
            0x1234,
            0xABCD,
        );
        let bytes = util::object_to_bytes(&hd);
        assert_eq!(bytes.len(), 16);

        let other = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(other & 0x7, 1);
        assert_eq!((other >> 3) & 0xF, 6);
        assert_eq!((other >> 7) & 0xFFF, 0x123);
        assert_eq!(other >> 19, 440);
        assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), 17);
        assert_eq!(u16::from_le_bytes([bytes[6], bytes[7]]), 4);
        assert_eq!(
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            0x1234
        );
        assert_eq!(
            u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
            0xABCD
        );

        assert_eq!(hd.flags(), HeaderFlags::REPLY);
        assert_eq!(hd.sender_tile(), TileId::new(1, 0x23));
        assert_eq!(hd.sender_ep(), 17);
        assert_eq!(hd.reply_ep(), 4);
        assert_eq!(hd.length(), 440);
        assert_eq!(hd.reply_label(), 0x1234);
        assert_eq!(hd.label(), 0xABCD);
    }

    #[test]
    fn message_view() {
        let mut words = [0u64; 4];
        let hd = Header::new(HeaderFlags::empty(), 0, TileId::new(0, 1), 0, 0, 16, 0, 7);
        unsafe { ptr::write(words.as_mut_ptr() as *mut Header, hd) };
        words[2] = 42;
        words[3] = 43;

        let msg = unsafe { Message::from_addr(words.as_ptr() as usize) };
        assert_eq!(msg.header.label(), 7);
        assert_eq!(msg.data.len(), 16);
        assert_eq!(msg.as_words(), &[42, 43]);
        assert_eq!(msg.addr(), words.as_ptr() as usize);
    }
}
