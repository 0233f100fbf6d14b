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

mod common;

use m3::com::{MemGate, Perm};
use m3::errors::{Code, Error};
use m3::tcu::TCU;
use m3::test::{DefaultWvTester, WvTester};
use m3::{wv_assert_eq, wv_assert_err, wv_assert_ok, wv_run_test};

fn bounds(t: &mut dyn WvTester) {
    let mgate = wv_assert_ok!(MemGate::new(4096, Perm::RW));
    wv_assert_eq!(t, mgate.size(), Ok(4096));

    let mut buf = vec![0u8; 4097];
    let cmds = TCU::command_count();
    wv_assert_err!(t, mgate.read(&mut buf, 0), Code::OutOfBounds);
    wv_assert_err!(t, mgate.read(&mut buf[0..1], 4096), Code::OutOfBounds);
    wv_assert_err!(t, mgate.read(&mut buf[0..8], u64::MAX), Code::OutOfBounds);
    // none of them reached the TCU
    wv_assert_eq!(t, TCU::command_count(), cmds);

    wv_assert_ok!(mgate.write(&buf[0..1024], 3072));
    wv_assert_err!(t, mgate.write(&buf[0..1024], 3073), Code::OutOfBounds);
}

fn perms(t: &mut dyn WvTester) {
    let mut data = [0u8; 8];

    let ro = wv_assert_ok!(MemGate::new(0x1000, Perm::R));
    wv_assert_err!(t, ro.write(&data, 0), Code::NoPerm);
    wv_assert_ok!(ro.read(&mut data, 0));

    let wo = wv_assert_ok!(MemGate::new(0x1000, Perm::W));
    wv_assert_err!(t, wo.read(&mut data, 0), Code::NoPerm);
    wv_assert_ok!(wo.write(&data, 0));
}

fn read_write(t: &mut dyn WvTester) {
    let mgate = wv_assert_ok!(MemGate::new(0x2000, Perm::RW));

    // more than one packet
    let refdata = (0..0x1800).map(|i| i as u8).collect::<Vec<u8>>();
    wv_assert_ok!(mgate.write(&refdata, 0x100));
    let mut data = vec![0u8; refdata.len()];
    wv_assert_ok!(mgate.read(&mut data, 0x100));
    wv_assert_eq!(t, data, refdata);

    wv_assert_ok!(mgate.write_obj(&0x1234_5678_u64, 0x8));
    wv_assert_eq!(t, mgate.read_obj::<u64>(0x8), Ok(0x1234_5678));
}

fn derive(t: &mut dyn WvTester) {
    let mgate = wv_assert_ok!(MemGate::new(0x1000, Perm::RW));
    wv_assert_err!(t, mgate.derive(0x0, 0x2000, Perm::RW), Code::InvArgs);
    wv_assert_err!(t, mgate.derive(0x1000, 0x10, Perm::RW), Code::InvArgs);
    wv_assert_err!(t, mgate.derive(0x800, 0x1000, Perm::RW), Code::InvArgs);

    wv_assert_ok!(mgate.write_obj(&0xDEAD_BEEF_u64, 0x800));

    let dgate = wv_assert_ok!(mgate.derive(0x800, 0x800, Perm::R));
    wv_assert_eq!(t, dgate.size(), Ok(0x800));
    wv_assert_eq!(t, dgate.read_obj::<u64>(0), Ok(0xDEAD_BEEF));
    wv_assert_err!(t, dgate.write_obj(&0u64, 0), Code::NoPerm);
    wv_assert_err!(t, dgate.read_obj::<u64>(0x800), Code::OutOfBounds);

    let (_tile, _addr, size) = wv_assert_ok!(dgate.region());
    wv_assert_eq!(t, size, 0x800);
}

fn mgate() -> Result<(), Error> {
    let mut t = DefaultWvTester::default();
    wv_run_test!(t, bounds);
    wv_run_test!(t, perms);
    wv_run_test!(t, read_write);
    wv_run_test!(t, derive);
    t.result()
}

#[test]
fn memory_gates() {
    assert_eq!(common::run(mgate), Code::Success);
}
