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

use crate::mem;

/// The maximum size of a message including the TCU header
pub const MAX_MSG_SIZE: usize = 512;

const MAX_WORDS: usize = MAX_MSG_SIZE / mem::size_of::<u64>();

// messages cannot contain a page boundary, so make sure that they are max-size-aligned
#[repr(C, align(512))]
/// A buffer for messages that takes care of proper alignment to fulfill the alignment requirements
/// of the TCU.
///
/// Besides the message itself, the buffer knows its capacity, which is the maximum number of bytes
/// the message may occupy. Exceeding the capacity while building a message is a programming error.
pub struct MsgBuf {
    words: [u64; MAX_WORDS],
    size: usize,
    cap: usize,
}

impl MsgBuf {
    /// Creates a new message buffer containing an empty message
    pub const fn new() -> Self {
        Self::with_capacity(MAX_MSG_SIZE)
    }

    /// Creates a new message buffer for messages of at most `cap` bytes
    ///
    /// # Panics
    ///
    /// Panics if `cap` exceeds [`MAX_MSG_SIZE`].
    pub const fn with_capacity(cap: usize) -> Self {
        assert!(cap <= MAX_MSG_SIZE);
        Self {
            words: [0; MAX_WORDS],
            size: 0,
            cap,
        }
    }

    /// Returns the message bytes
    pub fn bytes(&self) -> &[u8] {
        let p: *const u64 = self.words.as_ptr();
        // safety: the words array is initialized and size never exceeds it
        unsafe { core::slice::from_raw_parts(p as *const u8, self.size) }
    }

    /// Returns the message as words (rounded up)
    pub fn words(&self) -> &[u64] {
        &self.words[0..(self.size + 7) / 8]
    }

    /// Returns the number of bytes to send
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the maximum number of bytes this buffer can hold
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Returns a mutable u64 slice that covers the capacity of the buffer
    pub fn words_mut(&mut self) -> &mut [u64] {
        &mut self.words[0..(self.cap + 7) / 8]
    }

    /// Sets the number of bytes that will be sent by the TCU.
    pub fn set_size(&mut self, size: usize) {
        assert!(size <= self.cap);
        self.size = size;
    }

    /// Sets the message to the given slice
    pub fn set_from_slice(&mut self, bytes: &[u8]) {
        assert!(bytes.len() <= self.cap);
        let p: *mut u64 = self.words.as_mut_ptr();
        // safety: the length is within the capacity, which is within the words array
        unsafe {
            core::slice::from_raw_parts_mut(p as *mut u8, bytes.len()).copy_from_slice(bytes)
        };
        self.size = bytes.len();
    }
}

impl Default for MsgBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MsgBuf {
    fn clone(&self) -> Self {
        let mut copy = Self::with_capacity(self.cap);
        copy.set_from_slice(self.bytes());
        copy
    }
}

impl fmt::Debug for MsgBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MsgBuf[size={}, cap={}, words={:x?}]", self.size, self.cap, self.words())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        assert_eq!(mem::align_of::<MsgBuf>(), 512);
        let mut buf = MsgBuf::with_capacity(16);
        buf.set_from_slice(b"hello");
        assert_eq!(buf.bytes(), b"hello");
        assert_eq!(buf.words().len(), 1);
        assert_eq!(buf.words_mut().len(), 2);
        assert_eq!(buf.clone().bytes(), b"hello");
    }

    #[test]
    #[should_panic]
    fn overrun() {
        let mut buf = MsgBuf::with_capacity(8);
        buf.set_from_slice(b"0123456789");
    }
}
