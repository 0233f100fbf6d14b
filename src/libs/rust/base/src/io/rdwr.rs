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

//! Contains the read and write traits

use core::cmp;
use core::fmt;

use crate::col::{String, Vec};
use crate::errors::{Code, Error};
use crate::util;

// this is inspired from std::io::{Read, Write}

/// A trait for objects that support byte-oriented reading
pub trait Read {
    /// Read some bytes from this source into the given buffer and returns the number of read bytes
    ///
    /// A return value of 0 denotes the end of the source.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error>;

    /// Reads all available bytes from this source into the given vector and returns the number of
    /// read bytes
    fn read_to_end(&mut self, buf: &mut Vec<u8>) -> Result<usize, Error> {
        let mut cap = cmp::max(64, buf.capacity() * 2);
        let old_len = buf.len();
        let mut off = old_len;

        'outer: loop {
            buf.resize(cap, 0);

            while off < cap {
                let count = self.read(&mut buf.as_mut_slice()[off..cap])?;

                // stop on EOF
                if count == 0 {
                    break 'outer;
                }

                off += count;
            }

            cap *= 2;
        }

        // set final length
        buf.truncate(off);
        Ok(off - old_len)
    }

    /// Reads all available bytes from this source into a string
    fn read_to_string(&mut self) -> Result<String, Error> {
        let mut v = Vec::new();
        self.read_to_end(&mut v)?;
        String::from_utf8(v).map_err(|_| Error::new(Code::Utf8Error))
    }

    /// Reads exactly as many bytes as available in `buf`
    ///
    /// # Errors
    ///
    /// If any I/O error occurs, [`Err`] will be returned. If less bytes are available, [`Err`] will
    /// be returned with [`EndOfFile`](Code::EndOfFile) as the error code.
    fn read_exact(&mut self, mut buf: &mut [u8]) -> Result<(), Error> {
        while !buf.is_empty() {
            match self.read(buf)? {
                0 => return Err(Error::new(Code::EndOfFile)),
                n => {
                    let tmp = buf;
                    buf = &mut tmp[n..];
                },
            }
        }
        Ok(())
    }
}

/// A trait for objects that support byte-oriented writing
pub trait Write {
    /// Writes some bytes of the given buffer to this sink and returns the number of written bytes
    fn write(&mut self, buf: &[u8]) -> Result<usize, Error>;

    /// Flushes the underlying buffer, if any
    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Writes all bytes of the given buffer to this sink
    ///
    /// # Errors
    ///
    /// If any I/O error occurs, [`Err`] will be returned. If the sink does not accept more bytes,
    /// [`Err`] will be returned with [`NoSpace`](Code::NoSpace) as the error code.
    fn write_all(&mut self, mut buf: &[u8]) -> Result<(), Error> {
        while !buf.is_empty() {
            match self.write(buf)? {
                0 => return Err(Error::new(Code::NoSpace)),
                n => buf = &buf[n..],
            }
        }
        Ok(())
    }

    /// Writes the given formatting arguments into this sink
    fn write_fmt(&mut self, fmt: fmt::Arguments<'_>) -> Result<(), Error> {
        // translates a Write into a fmt::Write and keeps the first I/O error
        struct Adaptor<'a, T: ?Sized> {
            inner: &'a mut T,
            error: Result<(), Error>,
        }

        impl<'a, T: Write + ?Sized> fmt::Write for Adaptor<'a, T> {
            fn write_str(&mut self, s: &str) -> fmt::Result {
                self.inner.write_all(s.as_bytes()).map_err(|e| {
                    self.error = Err(e);
                    fmt::Error
                })
            }
        }

        let mut output = Adaptor {
            inner: self,
            error: Ok(()),
        };
        match fmt::write(&mut output, fmt) {
            Ok(()) => Ok(()),
            Err(..) if output.error.is_err() => output.error,
            Err(..) => Err(Error::new(Code::InvArgs)),
        }
    }
}

/// Convenience method that reads `mem::size_of::<T>()` bytes from the given source and interprets
/// them as a `T`
pub fn read_object<T: Default>(r: &mut dyn Read) -> Result<T, Error> {
    let mut obj: T = T::default();
    r.read_exact(util::object_to_bytes_mut(&mut obj))
        .map(|_| obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Chunked<'a> {
        data: &'a [u8],
        chunk: usize,
    }

    impl<'a> Read for Chunked<'a> {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
            let amount = cmp::min(cmp::min(buf.len(), self.chunk), self.data.len());
            buf[..amount].copy_from_slice(&self.data[..amount]);
            self.data = &self.data[amount..];
            Ok(amount)
        }
    }

    #[test]
    fn read_all() {
        let text = b"This is a test\n".repeat(20);
        let mut src = Chunked {
            data: &text,
            chunk: 7,
        };
        let s = src.read_to_string().unwrap();
        assert_eq!(s.as_bytes(), &text[..]);
    }

    #[test]
    fn read_exact_eof() {
        let mut src = Chunked {
            data: b"abc",
            chunk: 2,
        };
        let mut buf = [0u8; 4];
        assert_eq!(
            src.read_exact(&mut buf).err().map(|e| e.code()),
            Some(Code::EndOfFile)
        );
        assert_eq!(&buf[..3], b"abc");
    }

    #[test]
    fn format() {
        struct Sink(Vec<u8>);
        impl Write for Sink {
            fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
                self.0.extend_from_slice(buf);
                Ok(buf.len())
            }
        }

        let mut s = Sink(Vec::new());
        s.write_fmt(format_args!("{}-{:#x}", 42, 255)).unwrap();
        assert_eq!(&s.0[..], b"42-0xff");
    }
}
