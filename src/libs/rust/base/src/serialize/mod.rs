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

//! Contains the serializing basics, which is used for IPC
//!
//! Values are serialized into a stream of 64-bit words. Scalars occupy one word each. Strings are
//! stored as a word with the length including the null terminator, followed by the bytes, the
//! null byte, and padding to the next word. Byte slices are stored the same way, but without null
//! terminator. `None` is encoded as `!0`.

mod de;
mod error;
mod ser;
mod size;

pub use self::de::M3Deserializer;
pub use self::ser::{M3Serializer, Sink, SliceSink, VecSink};
pub use self::size::{osize_of, OStreamSize, DEFAULT_MAX_LEN};
pub use serde::{self, Deserialize, Deserializer, Serialize, Serializer};
pub use serde_bytes as bytes;

/// Constructs a message with the arguments `$args` into the given message buffer `$msg`
///
/// # Panics
///
/// Panics if the arguments do not fit into the capacity of the message buffer.
#[macro_export]
macro_rules! build_vmsg {
    ( $msg:expr, $( $args:expr ),* ) => ({
        let sink = $crate::serialize::SliceSink::new($msg.words_mut());
        let mut ser = $crate::serialize::M3Serializer::new(sink);
        $( ser.push(&$args); )*
        let bytes = ser.size();
        $msg.set_size(bytes);
    });
}

/// Creates a new message buffer that is large enough for the arguments `$args` and serializes the
/// arguments into it
///
/// The capacity of the buffer is the upper bound determined by [`OStreamSize`] for the types of
/// the arguments. Strings are assumed to be shorter than [`DEFAULT_MAX_LEN`]; longer strings have
/// to be sent via [`build_vmsg`] and a full-sized buffer instead.
#[macro_export]
macro_rules! create_vmsg {
    ( $( $args:expr ),+ ) => ({
        let args = ( $( &$args, )+ );
        let mut msg = $crate::mem::MsgBuf::with_capacity($crate::serialize::osize_of(&args));
        $crate::build_vmsg!(msg, args);
        msg
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::col::{String, Vec};
    use crate::errors::Code;
    use crate::kif::syscalls::MAX_MSG_SIZE;
    use crate::mem::MsgBuf;

    fn round_trip<'de, T>(val: &T, words: &'de mut Vec<u64>) -> T
    where
        T: Serialize + Deserialize<'de>,
    {
        let mut ser = M3Serializer::new(VecSink::new());
        ser.push(val);
        *words = ser.into_sink().into_vec();
        let mut de = M3Deserializer::new(words);
        let res = de.pop().unwrap();
        assert_eq!(de.remaining(), 0);
        res
    }

    #[test]
    fn scalars() {
        let mut words = Vec::new();
        assert_eq!(round_trip(&42u64, &mut words), 42);
        assert_eq!(round_trip(&-5i32, &mut words), -5);
        assert_eq!(round_trip(&0xFFu8, &mut words), 0xFF);
        assert!(round_trip(&true, &mut words));
        assert_eq!(round_trip(&Code::RecvGone, &mut words), Code::RecvGone);
        assert_eq!(round_trip(&Some(7u32), &mut words), Some(7));
        assert_eq!(round_trip(&None::<u32>, &mut words), None);
    }

    #[test]
    fn boundary_strings() {
        let mut words = Vec::new();
        assert_eq!(round_trip(&String::new(), &mut words), "");
        assert_eq!(words.len(), 2);

        let s47 = "a".repeat(DEFAULT_MAX_LEN - 1);
        assert_eq!(round_trip(&s47, &mut words), s47);
        assert_eq!(words.len() * 8, <String as OStreamSize>::OSIZE);

        let s8 = "12345678";
        let mut words = Vec::new();
        assert_eq!(round_trip(&String::from(s8), &mut words), s8);
        // length word, 8 bytes, and a word for the null termination
        assert_eq!(words.len(), 3);
    }

    #[test]
    fn borrowed_str() {
        let mut buf = MsgBuf::new();
        build_vmsg!(buf, 1u64, "hello");
        let mut de = M3Deserializer::new(buf.words());
        assert_eq!(de.pop::<u64>().unwrap(), 1);
        assert_eq!(de.pop::<&str>().unwrap(), "hello");
    }

    #[test]
    fn bytes() {
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8, 9];
        let mut ser = M3Serializer::new(VecSink::new());
        ser.push(bytes::Bytes::new(&data));
        let words = ser.into_sink().into_vec();
        assert_eq!(words.len(), 3);
        let mut de = M3Deserializer::new(&words);
        let res: &bytes::Bytes = de.pop().unwrap();
        assert_eq!(&res[..], &data[..]);
    }

    #[test]
    fn insufficient_words() {
        let words = [5u64];
        let mut de = M3Deserializer::new(&words);
        assert_eq!(de.pop::<u64>().unwrap(), 5);
        assert_eq!(de.pop::<u64>().err().map(|e| e.code()), Some(Code::InvArgs));

        // string that claims to be longer than the message
        let words = [20u64, 0];
        let mut de = M3Deserializer::new(&words);
        assert_eq!(de.pop::<&str>().err().map(|e| e.code()), Some(Code::InvArgs));

        // invalid UTF-8
        let words = [3u64, 0xFFFF];
        let mut de = M3Deserializer::new(&words);
        assert_eq!(de.pop::<&str>().err().map(|e| e.code()), Some(Code::InvArgs));
    }

    #[test]
    fn vmsg_size() {
        let msg = create_vmsg!(42u64, "hello");
        assert_eq!(msg.capacity(), 8 + 8 + DEFAULT_MAX_LEN);
        assert!(msg.capacity() <= MAX_MSG_SIZE);
        assert_eq!(msg.size(), 8 + 8 + 8);

        let msg = create_vmsg!(Code::Success, 1u32, 2u16, 3u8);
        assert_eq!(msg.capacity(), 4 * 8);
        assert_eq!(msg.size(), msg.capacity());
    }

    #[test]
    #[should_panic]
    fn vmsg_overrun() {
        let long = "a".repeat(DEFAULT_MAX_LEN);
        create_vmsg!(long);
    }
}
