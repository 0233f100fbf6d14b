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

//! Contains the logger

use core::cmp;

use crate::cell::RefCell;
use crate::errors::Error;
use crate::io::{LogFlags, Serial, Write};
use crate::tcu::{TileId, TCU};

const MAX_LINE_LEN: usize = 180;
const SUFFIX: &[u8] = b"\x1B[0m";

activity_local! {
    static LOG: RefCell<Option<Log>> = RefCell::new(None);
}

/// A buffered logger that writes to the serial line
///
/// Each line is prefixed with the tile id, the (shortened) name of the activity, and the current
/// time in microseconds.
pub struct Log {
    serial: Serial,
    buf: [u8; MAX_LINE_LEN],
    pos: usize,
    time_pos: usize,
    start_pos: usize,
    flags: LogFlags,
}

impl Log {
    /// Calls `func` with the logger of the current activity
    ///
    /// Returns `None` if the logger has not been initialized yet or is currently in use (e.g., if
    /// the TCU logs while a log line is flushed).
    pub fn with<R, F: FnOnce(&mut Log) -> R>(func: F) -> Option<R> {
        LOG.with(|l| match l.try_borrow_mut() {
            Ok(mut log) => log.as_mut().map(func),
            Err(_) => None,
        })
    }

    const fn new(flags: LogFlags) -> Self {
        Log {
            serial: Serial::new(),
            buf: [0; MAX_LINE_LEN],
            pos: 0,
            time_pos: 0,
            start_pos: 0,
            flags,
        }
    }

    /// Returns the enabled log flags
    pub fn flags(&self) -> LogFlags {
        self.flags
    }

    /// Sets the log flags to `flags`
    pub fn set_flags(&mut self, flags: LogFlags) {
        self.flags = flags;
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.put_char(*b)
        }
    }

    fn put_char(&mut self, c: u8) {
        self.buf[self.pos] = c;
        self.pos += 1;

        if c == b'\n' || self.pos + SUFFIX.len() + 1 >= MAX_LINE_LEN {
            for c in SUFFIX {
                self.buf[self.pos] = *c;
                self.pos += 1;
            }
            if c != b'\n' {
                self.buf[self.pos] = b'\n';
                self.pos += 1;
            }

            // there is nobody to report the error to
            self.flush().ok();
        }
    }

    fn init(&mut self, tile_id: TileId, name: &str) {
        let colors = ["31", "32", "33", "34", "35", "36"];
        let begin = match name.rfind('/') {
            Some(b) => b + 1,
            None => 0,
        };
        let len = cmp::min(name.len() - begin, 8);

        self.pos = 0;
        self.write_fmt(format_args!(
            "\x1B[0;{}m[{}:{:<8}@",
            colors[(tile_id.tile() as usize) % colors.len()],
            tile_id,
            &name[begin..begin + len]
        ))
        .ok();
        self.time_pos = self.pos;
        self.start_pos = self.pos + 11 + 2;
        self.pos = self.start_pos;
    }
}

impl Write for Log {
    fn flush(&mut self) -> Result<(), Error> {
        let length = self.pos;
        self.pos = self.time_pos;
        self.write_fmt(format_args!(
            "{:11}] ",
            (TCU::nanotime() / 1000) % 10_000_000_000
        ))?;
        let res = self.serial.write(&self.buf[0..length]);
        self.pos = self.start_pos;
        res.map(|_| ())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        self.write_bytes(buf);
        Ok(buf.len())
    }
}

/// Initializes the logger of the current activity
pub fn init(tile_id: TileId, name: &str, flags: LogFlags) {
    LOG.with(|l| {
        let mut log = Log::new(flags);
        log.init(tile_id, name);
        l.replace(Some(log));
    });
}
