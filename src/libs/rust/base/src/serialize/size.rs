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

use crate::col::String;
use crate::errors::Code;
use crate::mem;

/// The string length that is assumed when computing the upper bound of a message size
///
/// Strings up to `DEFAULT_MAX_LEN - 1` bytes fit into the reserved space, because the null
/// termination is stored as well.
pub const DEFAULT_MAX_LEN: usize = 48;

const WORD: usize = mem::size_of::<u64>();

/// Determines the upper bound of the serialized size of a type in bytes
pub trait OStreamSize {
    const OSIZE: usize;
}

/// Returns the upper bound of the serialized size of `val` in bytes
pub const fn osize_of<T: OStreamSize>(_val: &T) -> usize {
    T::OSIZE
}

macro_rules! impl_word_size {
    ($($t:ty),*) => {
        $(
            impl OStreamSize for $t {
                const OSIZE: usize = WORD;
            }
        )*
    };
}

impl_word_size!(bool, char, u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, f32, f64, Code);

impl OStreamSize for str {
    const OSIZE: usize = WORD + DEFAULT_MAX_LEN;
}

impl OStreamSize for String {
    const OSIZE: usize = WORD + DEFAULT_MAX_LEN;
}

impl<T: OStreamSize> OStreamSize for Option<T> {
    const OSIZE: usize = T::OSIZE;
}

impl<'a, T: OStreamSize + ?Sized> OStreamSize for &'a T {
    const OSIZE: usize = T::OSIZE;
}

macro_rules! impl_tuple_size {
    ($($name:ident)+) => {
        impl<$($name: OStreamSize),+> OStreamSize for ($($name,)+) {
            const OSIZE: usize = 0 $( + $name::OSIZE )+;
        }
    };
}

impl_tuple_size!(A);
impl_tuple_size!(A B);
impl_tuple_size!(A B C);
impl_tuple_size!(A B C D);
impl_tuple_size!(A B C D E);
impl_tuple_size!(A B C D E F);
impl_tuple_size!(A B C D E F G);
impl_tuple_size!(A B C D E F G H);
impl_tuple_size!(A B C D E F G H I);
impl_tuple_size!(A B C D E F G H I J);
