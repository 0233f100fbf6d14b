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

use serde::{ser, Serialize, Serializer};

use crate::col::Vec;
use crate::errors::{Code, Error};
use crate::mem;

/// The destination of an [`M3Serializer`]
pub trait Sink {
    /// Returns the number of bytes written so far
    fn size(&self) -> usize;

    /// Returns the written words
    fn words(&self) -> &[u64];

    /// Appends the given word
    fn push(&mut self, word: u64);

    /// Appends the given bytes, padded with zeros to the next word boundary
    fn push_bytes(&mut self, bytes: &[u8]);
}

/// A sink that writes into a fixed-size slice of words
///
/// # Panics
///
/// Writing beyond the end of the slice is a programming error and panics.
pub struct SliceSink<'s> {
    slice: &'s mut [u64],
    pos: usize,
}

impl<'s> SliceSink<'s> {
    pub fn new(slice: &'s mut [u64]) -> Self {
        Self { slice, pos: 0 }
    }

    fn reserve(&self, words: usize) {
        assert!(
            self.pos + words <= self.slice.len(),
            "message buffer overrun: {} + {} words > {}",
            self.pos,
            words,
            self.slice.len()
        );
    }
}

impl<'s> Sink for SliceSink<'s> {
    fn size(&self) -> usize {
        self.pos * mem::size_of::<u64>()
    }

    fn words(&self) -> &[u64] {
        &self.slice[0..self.pos]
    }

    #[inline(always)]
    fn push(&mut self, word: u64) {
        self.reserve(1);
        self.slice[self.pos] = word;
        self.pos += 1;
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        let words = (bytes.len() + 7) / 8;
        self.reserve(words);
        copy_bytes(&mut self.slice[self.pos..self.pos + words], bytes);
        self.pos += words;
    }
}

/// A sink that writes into a growing vector of words
#[derive(Default)]
pub struct VecSink {
    vec: Vec<u64>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the contained vector
    pub fn into_vec(self) -> Vec<u64> {
        self.vec
    }
}

impl Sink for VecSink {
    fn size(&self) -> usize {
        self.vec.len() * mem::size_of::<u64>()
    }

    fn words(&self) -> &[u64] {
        &self.vec
    }

    fn push(&mut self, word: u64) {
        self.vec.push(word);
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        let pos = self.vec.len();
        self.vec.resize(pos + (bytes.len() + 7) / 8, 0);
        copy_bytes(&mut self.vec[pos..], bytes);
    }
}

fn copy_bytes(words: &mut [u64], bytes: &[u8]) {
    for (w, chunk) in words.iter_mut().zip(bytes.chunks(8)) {
        let mut word = [0u8; 8];
        word[0..chunk.len()].copy_from_slice(chunk);
        *w = u64::from_le_bytes(word);
    }
}

/// The serializer for serializing values into a [`Sink`]
pub struct M3Serializer<S: Sink> {
    sink: S,
}

impl<S: Sink> M3Serializer<S> {
    #[inline(always)]
    pub fn new(sink: S) -> Self {
        M3Serializer { sink }
    }

    /// Returns the number of bytes serialized so far
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.sink.size()
    }

    /// Returns the serialized words
    #[inline(always)]
    pub fn words(&self) -> &[u64] {
        self.sink.words()
    }

    /// Returns the sink
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Serializes the given value
    ///
    /// # Panics
    ///
    /// Panics if the value contains types that are not supported by the serializer or if the
    /// sink is exhausted.
    #[inline(always)]
    pub fn push<T: Serialize>(&mut self, item: T) {
        if let Err(e) = item.serialize(self) {
            panic!("unable to serialize value: {:?}", e);
        }
    }

    #[inline(always)]
    pub fn push_word(&mut self, word: u64) {
        self.sink.push(word);
    }

    fn push_str(&mut self, s: &str) {
        let len = s.len() + 1;
        self.push_word(len as u64);
        // the padding provides the null termination, unless the string ends at a word boundary
        self.sink.push_bytes(s.as_bytes());
        if s.len() % 8 == 0 {
            self.sink.push(0);
        }
    }
}

// signed integers are sign-extended to a full word
macro_rules! serialize_word {
    ($($func:ident($ty:ty) => |$v:ident| $conv:expr),* $(,)?) => {
        $(
            #[inline(always)]
            fn $func(self, $v: $ty) -> Result<Self::Ok, Self::Error> {
                self.push_word($conv);
                Ok(())
            }
        )*
    };
}

impl<'a, S: Sink> Serializer for &'a mut M3Serializer<S> {
    type Error = Error;
    type Ok = ();
    type SerializeMap = ser::Impossible<(), Error>;
    type SerializeSeq = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = ser::Impossible<(), Error>;

    fn is_human_readable(&self) -> bool {
        false
    }

    #[inline(always)]
    fn serialize_unit(self) -> Result<Self::Ok, Self::Error> {
        Err(Error::new(Code::NotSup))
    }

    serialize_word!(
        serialize_bool(bool) => |v| v as u64,
        serialize_i8(i8) => |v| v as i64 as u64,
        serialize_i16(i16) => |v| v as i64 as u64,
        serialize_i32(i32) => |v| v as i64 as u64,
        serialize_i64(i64) => |v| v as u64,
        serialize_u8(u8) => |v| v as u64,
        serialize_u16(u16) => |v| v as u64,
        serialize_u32(u32) => |v| v as u64,
        serialize_u64(u64) => |v| v,
    );

    #[inline(always)]
    fn serialize_f32(self, v: f32) -> Result<Self::Ok, Self::Error> {
        self.push_word(v.to_bits() as u64);
        Ok(())
    }

    #[inline(always)]
    fn serialize_f64(self, v: f64) -> Result<Self::Ok, Self::Error> {
        self.push_word(v.to_bits());
        Ok(())
    }

    #[inline(always)]
    fn serialize_char(self, v: char) -> Result<Self::Ok, Self::Error> {
        self.push_word(v as u64);
        Ok(())
    }

    #[inline(always)]
    fn serialize_str(self, v: &str) -> Result<Self::Ok, Self::Error> {
        self.push_str(v);
        Ok(())
    }

    #[inline(always)]
    fn serialize_bytes(self, v: &[u8]) -> Result<Self::Ok, Self::Error> {
        self.push_word(v.len() as u64);
        self.sink.push_bytes(v);
        Ok(())
    }

    #[inline(always)]
    fn serialize_none(self) -> Result<Self::Ok, Self::Error> {
        // only supported for primitive integers
        self.push_word(!0);
        Ok(())
    }

    #[inline(always)]
    fn serialize_some<T: ?Sized + serde::Serialize>(
        self,
        value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        // only supported for primitive integers
        value.serialize(self)
    }

    #[inline(always)]
    fn serialize_unit_struct(self, _name: &'static str) -> Result<Self::Ok, Self::Error> {
        Ok(())
    }

    #[inline(always)]
    fn serialize_unit_variant(
        self,
        _name: &'static str,
        idx: u32,
        _variant: &'static str,
    ) -> Result<Self::Ok, Self::Error> {
        self.serialize_u32(idx)
    }

    #[inline(always)]
    fn serialize_newtype_struct<T: ?Sized + serde::Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        value.serialize(self)
    }

    #[inline(always)]
    fn serialize_newtype_variant<T: ?Sized + serde::Serialize>(
        self,
        _name: &'static str,
        idx: u32,
        _variant: &'static str,
        value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        self.serialize_u32(idx)?;
        value.serialize(self)
    }

    #[inline(always)]
    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        match len {
            None => return Err(Error::new(Code::NotSup)),
            Some(l) => self.serialize_u64(l as u64)?,
        };
        Ok(self)
    }

    #[inline(always)]
    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        Ok(self)
    }

    #[inline(always)]
    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        Ok(self)
    }

    #[inline(always)]
    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        Err(Error::new(Code::NotSup))
    }

    #[inline(always)]
    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Err(Error::new(Code::NotSup))
    }

    #[inline(always)]
    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        Ok(self)
    }

    #[inline(always)]
    fn serialize_struct_variant(
        self,
        _name: &'static str,
        idx: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        self.serialize_u32(idx)?;
        Ok(self)
    }
}

impl<'a, S: Sink> ser::SerializeSeq for &'a mut M3Serializer<S> {
    type Error = Error;
    type Ok = ();

    #[inline(always)]
    fn serialize_element<T: ?Sized + serde::Serialize>(
        &mut self,
        value: &T,
    ) -> Result<(), Self::Error> {
        value.serialize(&mut **self)
    }

    #[inline(always)]
    fn end(self) -> Result<Self::Ok, Self::Error> {
        Ok(())
    }
}

impl<'a, S: Sink> ser::SerializeTuple for &'a mut M3Serializer<S> {
    type Error = Error;
    type Ok = ();

    #[inline(always)]
    fn serialize_element<T: ?Sized + serde::Serialize>(
        &mut self,
        value: &T,
    ) -> Result<(), Self::Error> {
        value.serialize(&mut **self)
    }

    #[inline(always)]
    fn end(self) -> Result<Self::Ok, Self::Error> {
        Ok(())
    }
}

impl<'a, S: Sink> ser::SerializeTupleStruct for &'a mut M3Serializer<S> {
    type Error = Error;
    type Ok = ();

    #[inline(always)]
    fn serialize_field<T: ?Sized + serde::Serialize>(
        &mut self,
        value: &T,
    ) -> Result<(), Self::Error> {
        value.serialize(&mut **self)
    }

    #[inline(always)]
    fn end(self) -> Result<Self::Ok, Self::Error> {
        Ok(())
    }
}

impl<'a, S: Sink> ser::SerializeStruct for &'a mut M3Serializer<S> {
    type Error = Error;
    type Ok = ();

    #[inline(always)]
    fn serialize_field<T: ?Sized + serde::Serialize>(
        &mut self,
        _key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        value.serialize(&mut **self)
    }

    #[inline(always)]
    fn end(self) -> Result<Self::Ok, Self::Error> {
        Ok(())
    }
}

impl<'a, S: Sink> ser::SerializeStructVariant for &'a mut M3Serializer<S> {
    type Error = Error;
    type Ok = ();

    #[inline(always)]
    fn serialize_field<T: ?Sized + serde::Serialize>(
        &mut self,
        _key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        value.serialize(&mut **self)
    }

    #[inline(always)]
    fn end(self) -> Result<Self::Ok, Self::Error> {
        Ok(())
    }
}
