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

//! Contains the direct pipe, a unidirectional byte channel between two activities
//!
//! A direct pipe consists of a memory region that serves as ring buffer and a message channel
//! from the writer to the reader. The writer puts the data into the ring buffer and sends the
//! position and length of the data to the reader, which reads the data and replies the number of
//! consumed bytes. Both ends signal their end via a message of length zero: the writer's EOF is a
//! message with zero length, the reader's EOF is a reply with zero length.
//!
//! The parent creates the pipe via [`DirectPipe`], which adds both ends to the parent's file
//! table. The ends are usually handed to two children via
//! [`ChildActivity::add_file`](crate::tiles::ChildActivity::add_file).

use core::cmp;
use core::fmt;

use crate::cap::Selector;
use crate::cell::Cell;
use crate::com::{recv_reply, MemGate, Perm, RGateArgs, RecvGate, SGateArgs, SendGate};
use crate::errors::{Code, Error};
use crate::io::{LogFlags, Read, Write};
use crate::kif::{CapRngDesc, CapType};
use crate::log;
use crate::mem::{GlobOff, MsgBuf};
use crate::serialize::{M3Deserializer, M3Serializer, VecSink};
use crate::tcu::Message;
use crate::tiles::{Activity, ChildActivity};
use crate::util::math;
use crate::vfs::{Fd, File, FileEvent};
use crate::{build_vmsg, send_vmsg};

/// The size of the messages between writer and reader
pub const MSG_SIZE: usize = 64;
/// The size of the receive buffer for the messages, which bounds the messages in flight
pub const MSG_BUF_SIZE: usize = 256;

const MSG_ORDER: u32 = math::next_log2(MSG_SIZE);
const MSG_BUF_ORDER: u32 = math::next_log2(MSG_BUF_SIZE);
const CAPACITY: u32 = (MSG_BUF_SIZE / MSG_SIZE) as u32;

/// A direct pipe
///
/// The pipe uses three consecutive capability selectors: the receive gate, the memory gate, and
/// the send gate. The reading end uses the first two, the writing end the last two. Dropping the
/// [`DirectPipe`] closes both ends in the own file table and revokes all capabilities, so that it
/// needs to stay alive as long as the pipe is in use.
pub struct DirectPipe {
    rgate: RecvGate,
    mem: MemGate,
    sgate: SendGate,
    rd_fd: Option<Fd>,
    wr_fd: Option<Fd>,
}

impl DirectPipe {
    /// Creates a new pipe that uses the first `size` bytes of `mem` as ring buffer
    pub fn new(mem: &MemGate, size: usize) -> Result<Self, Error> {
        let own = Activity::own();
        let caps = own.alloc_sels(3);

        // the reader activates the receive gate
        let rgate = RecvGate::new_inactive(
            RGateArgs::default()
                .order(MSG_BUF_ORDER)
                .msg_order(MSG_ORDER)
                .sel(caps),
        )?;
        let mem = mem.derive_for(own.sel(), caps + 1, 0, size, Perm::RW)?;
        let sgate = SendGate::new_with(SGateArgs::new(&rgate).credits(CAPACITY).sel(caps + 2))?;

        let rd_fd = own
            .files()
            .add(File::PipeReader(PipeReader::new(caps, size)))?;
        let wr_fd = own
            .files()
            .add(File::PipeWriter(PipeWriter::new(caps + 1, size)))?;

        log!(
            LogFlags::LibDirPipe,
            "pipe: created with caps={}..{}, size={:#x}, rd_fd={}, wr_fd={}",
            caps,
            caps + 2,
            size,
            rd_fd,
            wr_fd
        );

        Ok(DirectPipe {
            rgate,
            mem,
            sgate,
            rd_fd: Some(rd_fd),
            wr_fd: Some(wr_fd),
        })
    }

    /// Returns the first of the three capability selectors
    pub fn caps(&self) -> Selector {
        self.rgate.sel()
    }

    /// Returns the file descriptor of the reading end
    pub fn reader_fd(&self) -> Option<Fd> {
        self.rd_fd
    }

    /// Returns the file descriptor of the writing end
    pub fn writer_fd(&self) -> Option<Fd> {
        self.wr_fd
    }

    /// Closes the reading end in the own file table
    pub fn close_reader(&mut self) {
        if let Some(fd) = self.rd_fd.take() {
            Activity::own().files().remove(fd);
        }
    }

    /// Closes the writing end in the own file table
    pub fn close_writer(&mut self) {
        if let Some(fd) = self.wr_fd.take() {
            Activity::own().files().remove(fd);
        }
    }
}

impl Drop for DirectPipe {
    fn drop(&mut self) {
        self.close_reader();
        self.close_writer();
    }
}

impl fmt::Debug for DirectPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DirectPipe[rgate: {}, mem: {}, sgate: {}, rd_fd: {:?}, wr_fd: {:?}]",
            self.rgate.sel(),
            self.mem.sel(),
            self.sgate.sel(),
            self.rd_fd,
            self.wr_fd
        )
    }
}

fn reply_len(rgate: &RecvGate, msg: &'static Message, len: usize) -> Result<(), Error> {
    let mut reply = MsgBuf::new();
    build_vmsg!(reply, len);
    rgate.reply(&reply, msg)
}

struct ReaderState {
    rgate: RecvGate,
    mem: MemGate,
    pending: Option<&'static Message>,
    pos: usize,
    rem: usize,
    pkglen: usize,
    eof: bool,
}

impl ReaderState {
    fn new(caps: Selector) -> Result<Self, Error> {
        let rgate = RecvGate::new_bind(caps, MSG_BUF_ORDER, MSG_ORDER)?;
        rgate.activate()?;
        Ok(ReaderState {
            rgate,
            mem: MemGate::new_bind(caps + 1),
            pending: None,
            pos: 0,
            rem: 0,
            pkglen: 0,
            eof: false,
        })
    }

    fn next_msg(&mut self) -> Result<(), Error> {
        // the writer gets the space back with the reply to the previous message
        if let Some(msg) = self.pending.take() {
            reply_len(&self.rgate, msg, self.pkglen)?;
        }

        let msg = self.rgate.receive(None)?;
        let mut de = M3Deserializer::new(msg.as_words());
        let (pos, len): (usize, usize) = match (de.pop(), de.pop()) {
            (Ok(pos), Ok(len)) => (pos, len),
            _ => {
                self.rgate.ack_msg(msg)?;
                return Err(Error::new(Code::InvArgs));
            },
        };

        log!(LogFlags::LibDirPipe, "pipe: received pos={:#x}, len={:#x}", pos, len);

        self.pos = pos;
        self.rem = len;
        self.pkglen = len;
        if len == 0 {
            self.eof = true;
            reply_len(&self.rgate, msg, 0)?;
        }
        else {
            self.pending = Some(msg);
        }
        Ok(())
    }
}

/// The reading end of a [`DirectPipe`]
pub struct PipeReader {
    caps: Selector,
    size: usize,
    state: Option<ReaderState>,
    delegated: Cell<bool>,
}

impl PipeReader {
    pub(crate) fn new(caps: Selector, size: usize) -> Self {
        PipeReader {
            caps,
            size,
            state: None,
            delegated: Cell::new(false),
        }
    }

    fn state(&mut self) -> Result<&mut ReaderState, Error> {
        let st = match self.state.take() {
            Some(st) => st,
            None => ReaderState::new(self.caps)?,
        };
        Ok(self.state.insert(st))
    }

    pub(crate) fn check_events(&mut self, events: FileEvent) -> bool {
        if !events.contains(FileEvent::INPUT) {
            return false;
        }
        match self.state() {
            Ok(st) => st.eof || st.rem > 0 || st.rgate.has_msgs(),
            Err(_) => true,
        }
    }

    pub(crate) fn delegate(&self, act: &ChildActivity) -> Result<(), Error> {
        act.delegate(CapRngDesc::new(CapType::Object, self.caps, 2))?;
        self.delegated.set(true);
        Ok(())
    }

    pub(crate) fn serialize(&self, s: &mut M3Serializer<VecSink>) {
        s.push(self.caps);
        s.push(self.size);
    }

    pub(crate) fn unserialize(s: &mut M3Deserializer<'_>) -> Result<Self, Error> {
        let caps = s.pop()?;
        let size = s.pop()?;
        Ok(Self::new(caps, size))
    }

    pub(crate) fn remove(&mut self) {
        // a reader that has been handed over to a child is not ours to close
        if self.delegated.get() {
            return;
        }

        if let Some(st) = self.state.as_mut() {
            if !st.eof {
                // a zero-length reply tells the writer that nobody reads anymore
                let msg = st.pending.take().or_else(|| st.rgate.fetch());
                if let Some(msg) = msg {
                    reply_len(&st.rgate, msg, 0).ok();
                }
                st.eof = true;
            }
        }
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let st = self.state()?;
        if st.eof {
            return Ok(0);
        }

        if st.rem == 0 {
            st.next_msg()?;
            if st.eof {
                return Ok(0);
            }
        }

        let amount = cmp::min(buf.len(), st.rem);
        let off = st.pos + (st.pkglen - st.rem);
        st.mem.read(&mut buf[0..amount], off as GlobOff)?;
        st.rem -= amount;
        Ok(amount)
    }
}

impl fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PipeReader[caps: {}, size: {:#x}]", self.caps, self.size)
    }
}

/// Bookkeeping of the writer for the ring buffer
///
/// The writer places every write at a contiguous spot in the ring buffer. Since the reader
/// consumes the data in order, the read position follows from the replies.
#[derive(Debug)]
struct Ring {
    size: usize,
    free: usize,
    rdpos: usize,
    wrpos: usize,
}

impl Ring {
    fn new(size: usize) -> Self {
        Ring {
            size,
            free: size,
            rdpos: 0,
            wrpos: 0,
        }
    }

    /// Finds a spot for up to `*amount` bytes, shrinks `*amount` to the available space at that
    /// spot, and returns the offset of the spot
    fn find_spot(&self, amount: &mut usize) -> Option<usize> {
        if self.free == 0 {
            return None;
        }

        if self.wrpos >= self.rdpos {
            if self.wrpos < self.size {
                *amount = cmp::min(*amount, self.size - self.wrpos);
                Some(self.wrpos)
            }
            else if self.rdpos > 0 {
                *amount = cmp::min(*amount, self.rdpos);
                Some(0)
            }
            else {
                None
            }
        }
        else {
            *amount = cmp::min(*amount, self.rdpos - self.wrpos);
            Some(self.wrpos)
        }
    }

    fn written(&mut self, off: usize, amount: usize) {
        self.wrpos = (off + amount) % self.size;
        self.free -= amount;
    }

    fn consumed(&mut self, amount: usize) {
        self.rdpos = (self.rdpos + amount) % self.size;
        self.free += amount;
    }
}

struct WriterState {
    mem: MemGate,
    sgate: SendGate,
    rgate: RecvGate,
    ring: Ring,
    capacity: u32,
    eof: bool,
}

impl WriterState {
    fn new(caps: Selector, size: usize) -> Result<Self, Error> {
        Ok(WriterState {
            mem: MemGate::new_bind(caps),
            sgate: SendGate::new_bind(caps + 1),
            rgate: RecvGate::new(MSG_BUF_ORDER, MSG_ORDER)?,
            ring: Ring::new(size),
            capacity: CAPACITY,
            eof: false,
        })
    }

    /// Waits for the next reply; returns false if the reader is gone
    fn read_reply(&mut self) -> Result<bool, Error> {
        let len = match recv_reply(&self.rgate, Some(&self.sgate)) {
            Ok(mut reply) => reply.pop::<usize>()?,
            // the reader exited without sending its EOF
            Err(e) if e.code() == Code::RecvGone => 0,
            Err(e) => return Err(e),
        };
        log!(LogFlags::LibDirPipe, "pipe: reader consumed {:#x} bytes", len);
        self.capacity += 1;
        if len == 0 {
            self.eof = true;
            return Ok(false);
        }
        self.ring.consumed(len);
        Ok(true)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        let mut written = 0;
        loop {
            let (off, amount) = loop {
                let mut amount = buf.len() - written;
                match self.ring.find_spot(&mut amount) {
                    Some(off) if self.capacity > 0 => break (off, amount),
                    _ => {
                        if !self.read_reply()? {
                            return Ok(written);
                        }
                    },
                }
            };

            if amount > 0 {
                self.mem
                    .write(&buf[written..written + amount], off as GlobOff)?;
            }
            self.ring.written(off, amount);
            self.capacity -= 1;

            log!(LogFlags::LibDirPipe, "pipe: sending pos={:#x}, len={:#x}", off, amount);
            send_vmsg!(&self.sgate, &self.rgate, off, amount)?;

            written += amount;
            if written >= buf.len() {
                break Ok(written);
            }
        }
    }

    fn send_eof(&mut self) -> Result<(), Error> {
        if self.eof {
            return Ok(());
        }

        self.write(&[])?;
        // wait until the reader has seen everything, unless it is gone
        while !self.eof && self.capacity < CAPACITY {
            if !self.read_reply()? {
                break;
            }
        }
        Ok(())
    }
}

/// The writing end of a [`DirectPipe`]
pub struct PipeWriter {
    caps: Selector,
    size: usize,
    state: Option<WriterState>,
    delegated: Cell<bool>,
}

impl PipeWriter {
    pub(crate) fn new(caps: Selector, size: usize) -> Self {
        PipeWriter {
            caps,
            size,
            state: None,
            delegated: Cell::new(false),
        }
    }

    fn state(&mut self) -> Result<&mut WriterState, Error> {
        let st = match self.state.take() {
            Some(st) => st,
            None => WriterState::new(self.caps, self.size)?,
        };
        Ok(self.state.insert(st))
    }

    pub(crate) fn check_events(&mut self, events: FileEvent) -> bool {
        if !events.contains(FileEvent::OUTPUT) {
            return false;
        }
        match self.state() {
            Ok(st) => {
                st.eof || (st.capacity > 0 && st.ring.free > 0) || st.rgate.has_msgs()
            },
            Err(_) => true,
        }
    }

    pub(crate) fn delegate(&self, act: &ChildActivity) -> Result<(), Error> {
        act.delegate(CapRngDesc::new(CapType::Object, self.caps, 2))?;
        self.delegated.set(true);
        Ok(())
    }

    pub(crate) fn serialize(&self, s: &mut M3Serializer<VecSink>) {
        s.push(self.caps);
        s.push(self.size);
    }

    pub(crate) fn unserialize(s: &mut M3Deserializer<'_>) -> Result<Self, Error> {
        let caps = s.pop()?;
        let size = s.pop()?;
        Ok(Self::new(caps, size))
    }

    pub(crate) fn remove(&mut self) {
        // the child that received the writer sends the EOF
        if self.delegated.get() {
            return;
        }

        match self.state() {
            Ok(st) => {
                if let Err(e) = st.send_eof() {
                    log!(LogFlags::Error, "pipe: unable to send EOF: {:?}", e);
                }
            },
            Err(e) => log!(LogFlags::Error, "pipe: unable to send EOF: {:?}", e),
        }
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        let st = self.state()?;
        if st.eof {
            return Ok(0);
        }
        // empty writes would be taken as EOF by the reader
        if buf.is_empty() {
            return Ok(0);
        }
        st.write(buf)
    }
}

impl fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PipeWriter[caps: {}, size: {:#x}]", self.caps, self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_wraps_around() {
        let mut ring = Ring::new(16);

        let mut amount = 10;
        assert_eq!(ring.find_spot(&mut amount), Some(0));
        assert_eq!(amount, 10);
        ring.written(0, amount);

        // only 6 bytes left until the end
        let mut amount = 10;
        assert_eq!(ring.find_spot(&mut amount), Some(10));
        assert_eq!(amount, 6);
        ring.written(10, amount);
        assert_eq!(ring.wrpos, 0);

        // full
        let mut amount = 1;
        assert_eq!(ring.find_spot(&mut amount), None);

        ring.consumed(10);
        let mut amount = 12;
        assert_eq!(ring.find_spot(&mut amount), Some(0));
        assert_eq!(amount, 10);
    }

    #[test]
    fn ring_zero_length() {
        let ring = Ring::new(8);
        let mut amount = 0;
        assert_eq!(ring.find_spot(&mut amount), Some(0));
        assert_eq!(amount, 0);
    }

    #[test]
    fn capacity() {
        assert_eq!(CAPACITY, 4);
        assert_eq!(MSG_ORDER, 6);
        assert_eq!(MSG_BUF_ORDER, 8);
    }
}
