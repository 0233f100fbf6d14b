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

use kernel::MachineConfig;

use m3::col::Vec;
use m3::errors::{Code, Error};
use m3::io::Read;
use m3::test::{DefaultWvTester, WvTester};
use m3::vfs::{OpenFlags, Seek, SeekMode, VFS};
use m3::{wv_assert, wv_assert_eq, wv_assert_err, wv_assert_ok, wv_run_test};

const TEST_FILE: &[u8] = b"This is a test\n";

fn large_file() -> Vec<u8> {
    (0..0x2800).map(|i| (i % 251) as u8).collect()
}

fn read_file(t: &mut dyn WvTester) {
    let mut file = wv_assert_ok!(VFS::open("/test.txt", OpenFlags::R));
    let content = file.read_to_string();
    wv_assert_eq!(t, content.as_deref(), Ok("This is a test\n"));
    // at the end
    let mut buf = [0u8; 4];
    wv_assert_eq!(t, file.read(&mut buf), Ok(0));

    wv_assert_eq!(t, file.seek(5, SeekMode::Set), Ok(5));
    wv_assert_ok!(file.read_exact(&mut buf[0..2]));
    wv_assert_eq!(t, &buf[0..2], b"is");
    wv_assert_eq!(t, file.seek(0, SeekMode::End), Ok(TEST_FILE.len()));
}

fn read_large(t: &mut dyn WvTester) {
    let mut file = wv_assert_ok!(VFS::open("/large.bin", OpenFlags::R));
    let mut data = Vec::new();
    wv_assert_eq!(t, file.read_to_end(&mut data), Ok(0x2800));
    wv_assert!(t, data == large_file());
}

fn stat(t: &mut dyn WvTester) {
    let info = wv_assert_ok!(VFS::stat("/large.bin"));
    wv_assert!(t, info.mode.is_reg());
    wv_assert_eq!(t, info.size, 0x2800);

    let file = wv_assert_ok!(VFS::open("/test.txt", OpenFlags::R));
    let info = wv_assert_ok!(file.stat());
    wv_assert_eq!(t, info.size, TEST_FILE.len());
}

fn errors(t: &mut dyn WvTester) {
    wv_assert_err!(t, VFS::open("/missing", OpenFlags::R), Code::NoSuchFile);
    wv_assert_err!(t, VFS::open("/test.txt", OpenFlags::RW), Code::NoPerm);
    wv_assert_err!(t, VFS::stat("/a/b"), Code::NoSuchFile);
    wv_assert_err!(t, VFS::open("/", OpenFlags::R), Code::NoSuchFile);
}

fn mounts(t: &mut dyn WvTester) {
    wv_assert_err!(t, VFS::mount("/", "bootfs"), Code::Exists);
    wv_assert_err!(t, VFS::mount("/foo", "m3fs"), Code::InvArgs);

    wv_assert_ok!(VFS::mount("/mods", "bootfs"));
    let mut file = wv_assert_ok!(VFS::open("/mods/test.txt", OpenFlags::R));
    let content = file.read_to_string();
    wv_assert_eq!(t, content.as_deref(), Ok("This is a test\n"));
    drop(file);
    wv_assert_ok!(VFS::unmount("/mods"));
    wv_assert_err!(t, VFS::unmount("/mods"), Code::NoSuchFile);
}

fn vfs() -> Result<(), Error> {
    let mut t = DefaultWvTester::default();
    VFS::mount("/", "bootfs")?;
    wv_run_test!(t, read_file);
    wv_run_test!(t, read_large);
    wv_run_test!(t, stat);
    wv_run_test!(t, errors);
    wv_run_test!(t, mounts);
    t.result()
}

#[test]
fn boot_modules() {
    let cfg = MachineConfig::default()
        .boot_mod("test.txt", TEST_FILE)
        .boot_mod("large.bin", &large_file());
    assert_eq!(common::run_with(cfg, vfs), Code::Success);
}
