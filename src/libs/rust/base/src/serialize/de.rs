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

use serde::de::{DeserializeSeed, EnumAccess, SeqAccess, VariantAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::col::{ToString, Vec};
use crate::errors::{Code, Error};

/// The deserializer for recreating values from a message
///
/// Strings and byte slices are borrowed from the underlying words, so that `&str` and `&[u8]`
/// can be deserialized without copying.
#[derive(Debug)]
pub struct M3Deserializer<'de> {
    slice: &'de [u64],
    pos: usize,
}

impl<'de> M3Deserializer<'de> {
    #[inline(always)]
    pub fn new(slice: &'de [u64]) -> M3Deserializer<'de> {
        M3Deserializer { slice, pos: 0 }
    }

    /// Returns the total number of words
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.slice.len()
    }

    /// Returns the number of words that have not been consumed yet
    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.slice.len() - self.pos
    }

    #[inline(always)]
    pub fn skip(&mut self, words: usize) {
        self.pos += words;
    }

    /// Retrieves an element of type T from the message
    ///
    /// # Errors
    ///
    /// Fails with [`InvArgs`](Code::InvArgs) if the message does not contain enough words.
    #[inline(always)]
    pub fn pop<T: Deserialize<'de>>(&mut self) -> Result<T, Error> {
        T::deserialize(self)
    }

    #[inline(always)]
    fn pop_word(&mut self) -> Result<u64, Error> {
        if self.pos >= self.slice.len() {
            return Err(Error::new(Code::InvArgs));
        }

        self.pos += 1;
        Ok(self.slice[self.pos - 1])
    }

    fn pop_str_slice(&mut self) -> Result<&'de str, Error> {
        let len = self.pop_word()? as usize;
        // the length includes the null termination
        if len == 0 {
            return Err(Error::new(Code::InvArgs));
        }
        let bytes = self.pop_bytes(len)?;
        core::str::from_utf8(&bytes[0..len - 1]).map_err(|_| Error::new(Code::InvArgs))
    }

    fn pop_byte_slice(&mut self) -> Result<&'de [u8], Error> {
        let len = self.pop_word()? as usize;
        self.pop_bytes(len)
    }

    fn pop_bytes(&mut self, len: usize) -> Result<&'de [u8], Error> {
        let npos = self.pos + (len + 7) / 8;
        if npos > self.slice.len() {
            return Err(Error::new(Code::InvArgs));
        }

        let words = &self.slice[self.pos..npos];
        self.pos = npos;
        // safety: the words cover at least `len` bytes and u8 has no alignment requirements
        Ok(unsafe { core::slice::from_raw_parts(words.as_ptr() as *const u8, len) })
    }
}

macro_rules! deserialize_word {
    ($($func:ident => $visit:ident as $ty:ty),* $(,)?) => {
        $(
            #[inline(always)]
            fn $func<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
                visitor.$visit(self.pop_word()? as $ty)
            }
        )*
    };
}

impl<'de, 'a> Deserializer<'de> for &'a mut M3Deserializer<'de> {
    type Error = Error;

    fn is_human_readable(&self) -> bool {
        // we never want to have a human-readable serialization
        false
    }

    #[inline(always)]
    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        // the format is not self-describing
        Err(Error::new(Code::NotSup))
    }

    deserialize_word!(
        deserialize_i8 => visit_i8 as i8,
        deserialize_i16 => visit_i16 as i16,
        deserialize_i32 => visit_i32 as i32,
        deserialize_i64 => visit_i64 as i64,
        deserialize_u8 => visit_u8 as u8,
        deserialize_u16 => visit_u16 as u16,
        deserialize_u32 => visit_u32 as u32,
        deserialize_u64 => visit_u64 as u64,
    );

    #[inline(always)]
    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_bool(self.pop_word()? != 0)
    }

    #[inline(always)]
    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_f32(f32::from_bits(self.pop_word()? as u32))
    }

    #[inline(always)]
    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_f64(f64::from_bits(self.pop_word()?))
    }

    #[inline(always)]
    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_char(
            char::from_u32(self.pop_word()? as u32).ok_or_else(|| Error::new(Code::InvArgs))?,
        )
    }

    #[inline(always)]
    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_borrowed_str(self.pop_str_slice()?)
    }

    #[inline(always)]
    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_string(self.pop_str_slice()?.to_string())
    }

    #[inline(always)]
    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_borrowed_bytes(self.pop_byte_slice()?)
    }

    #[inline(always)]
    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_byte_buf(Vec::from(self.pop_byte_slice()?))
    }

    #[inline(always)]
    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        if self.pos >= self.slice.len() {
            return Err(Error::new(Code::InvArgs));
        }

        // only supported for primitive integers
        if self.slice[self.pos] == !0 {
            self.pos += 1;
            visitor.visit_none()
        }
        else {
            visitor.visit_some(self)
        }
    }

    #[inline(always)]
    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    #[inline(always)]
    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    #[inline(always)]
    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    #[inline(always)]
    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        let len = self.pop_word()? as usize;
        visitor.visit_seq(SizedSeqAccess {
            de: self,
            pos: 0,
            len,
        })
    }

    #[inline(always)]
    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_seq(self)
    }

    #[inline(always)]
    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_seq(self)
    }

    #[inline(always)]
    fn deserialize_map<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        Err(Error::new(Code::NotSup))
    }

    #[inline(always)]
    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_seq(self)
    }

    #[inline(always)]
    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_enum(self)
    }

    #[inline(always)]
    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_u32(visitor)
    }

    #[inline(always)]
    fn deserialize_ignored_any<V: Visitor<'de>>(
        self,
        _visitor: V,
    ) -> Result<V::Value, Self::Error> {
        Err(Error::new(Code::NotSup))
    }
}

impl<'de, 'a> SeqAccess<'de> for &'a mut M3Deserializer<'de> {
    type Error = Error;

    #[inline(always)]
    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, Self::Error> {
        seed.deserialize(&mut **self).map(Some)
    }
}

struct SizedSeqAccess<'de, 'a> {
    de: &'a mut M3Deserializer<'de>,
    pos: usize,
    len: usize,
}

impl<'de, 'a> SeqAccess<'de> for SizedSeqAccess<'de, 'a> {
    type Error = Error;

    #[inline(always)]
    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, Self::Error> {
        if self.pos >= self.len {
            Ok(None)
        }
        else {
            self.pos += 1;
            seed.deserialize(&mut *self.de).map(Some)
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.len)
    }
}

impl<'de, 'a> EnumAccess<'de> for &'a mut M3Deserializer<'de> {
    type Error = Error;
    type Variant = Self;

    #[inline(always)]
    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, Self::Variant), Self::Error> {
        let value = seed.deserialize(&mut *self)?;
        Ok((value, self))
    }
}

impl<'de, 'a> VariantAccess<'de> for &'a mut M3Deserializer<'de> {
    type Error = Error;

    #[inline(always)]
    fn unit_variant(self) -> Result<(), Self::Error> {
        Ok(())
    }

    #[inline(always)]
    fn newtype_variant_seed<T: DeserializeSeed<'de>>(
        self,
        seed: T,
    ) -> Result<T::Value, Self::Error> {
        seed.deserialize(self)
    }

    #[inline(always)]
    fn tuple_variant<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_seq(self)
    }

    #[inline(always)]
    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_seq(self)
    }
}
