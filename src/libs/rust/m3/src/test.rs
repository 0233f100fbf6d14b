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

//! Contains unittest utilities inspired by WvTest <https://github.com/apenwarr/wvtest>
//!
//! Tests run within an activity and report failures on stdout. A failed assertion does not stop
//! the test, but is counted by the [`WvTester`], so that the activity can report the overall
//! result via its exit code (see [`DefaultWvTester::result`]).

use core::fmt;

use crate::errors::{Code, Error};
use crate::println;

/// Runs the tests and records the outcome of every check
pub trait WvTester {
    /// Runs the given test
    fn run_test(&mut self, name: &str, file: &str, f: &dyn Fn(&mut dyn WvTester));

    /// Records a check at `file`:`line`; `msg` is printed if it failed
    fn check(&mut self, ok: bool, file: &str, line: u32, msg: fmt::Arguments<'_>);
}

/// The default implementation for the [`WvTester`]
#[derive(Default, Copy, Clone, Debug)]
pub struct DefaultWvTester {
    tests: u64,
    fails: u64,
}

impl DefaultWvTester {
    pub fn tests(&self) -> u64 {
        self.tests
    }

    pub fn failures(&self) -> u64 {
        self.fails
    }

    /// Prints a summary and returns [`Unspecified`](Code::Unspecified) if any check failed
    pub fn result(&self) -> Result<(), Error> {
        println!(
            "WvTest: {} of {} checks succeeded",
            self.tests - self.fails,
            self.tests
        );
        match self.fails {
            0 => Ok(()),
            _ => Err(Error::new(Code::Unspecified)),
        }
    }
}

impl WvTester for DefaultWvTester {
    fn run_test(&mut self, name: &str, file: &str, f: &dyn Fn(&mut dyn WvTester)) {
        println!("Testing \"{}\" in {}:", name, file);
        f(self);
        println!();
    }

    fn check(&mut self, ok: bool, file: &str, line: u32, msg: fmt::Arguments<'_>) {
        self.tests += 1;
        if !ok {
            println!("! {}:{}  {} FAILED", file, line, msg);
            self.fails += 1;
        }
    }
}

/// Runs the given test function via [`WvTester::run_test`], using the function name as test name
#[macro_export]
macro_rules! wv_run_test {
    ($t:expr, $func:path) => {
        $t.run_test(stringify!($func), file!(), &$func)
    };
}

/// Checks whether `$a` is true
#[macro_export]
macro_rules! wv_assert {
    ($t:expr, $a:expr) => {{
        let ok: bool = $a;
        $t.check(ok, file!(), line!(), format_args!("{}", stringify!($a)))
    }};
}

/// Checks whether `$a` and `$b` are equal
#[macro_export]
macro_rules! wv_assert_eq {
    ($t:expr, $a:expr, $b:expr) => {{
        let (a, b) = (&$a, &$b);
        $t.check(*a == *b, file!(), line!(), format_args!("{:?} == {:?}", a, b))
    }};
}

/// Returns the value of the [`Ok`] argument, or reports the error and stops the test by panicking
#[macro_export]
macro_rules! wv_assert_ok {
    ($res:expr) => {
        match $res {
            Ok(r) => r,
            Err(e) => {
                $crate::println!(
                    "! {}:{}  expected Ok for {}, got {:?} FAILED",
                    file!(),
                    line!(),
                    stringify!($res),
                    e
                );
                panic!("Stopping tests here.")
            },
        }
    };
}

/// Returns the value of the [`Some`] argument, or stops the test by panicking
#[macro_export]
macro_rules! wv_assert_some {
    ($res:expr) => {
        match $res {
            Some(r) => r,
            None => {
                $crate::println!(
                    "! {}:{}  expected Some for {}, received None FAILED",
                    file!(),
                    line!(),
                    stringify!($res)
                );
                panic!("Stopping tests here.")
            },
        }
    };
}

/// Checks whether `$res` is an [`Err`] with the error code `$err`
#[macro_export]
macro_rules! wv_assert_err {
    ($t:expr, $res:expr, $err:expr) => {{
        let expected: $crate::errors::Code = $err;
        match $res {
            Ok(r) => $t.check(false, file!(), line!(), format_args!("received okay: {:?}", r)),
            Err(e) => $t.check(
                e.code() == expected,
                file!(),
                line!(),
                format_args!("received error {:?}, expected {:?}", e, expected),
            ),
        }
    }};
}

