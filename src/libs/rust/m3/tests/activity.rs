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

use m3::cap::Selector;
use m3::cfg;
use m3::col::Vec;
use m3::com::{MemGate, Perm, Semaphore};
use m3::elf::{ElfHeader, PHFlags, PHType, ProgramHeader, MAGIC};
use m3::env;
use m3::errors::{Code, Error};
use m3::io::{self, Read, Write, STDIN_FILENO, STDOUT_FILENO};
use m3::mem::{size_of, GlobOff};
use m3::test::{DefaultWvTester, WvTester};
use m3::tiles::{load_program, Activity, ChildActivity, OwnActivity, RunningActivity, Tile};
use m3::util;
use m3::vfs::{DirectPipe, OpenFlags, VFS};
use m3::{wv_assert_eq, wv_assert_err, wv_assert_ok, wv_assert_some, wv_run_test};

const TEST_FILE: &[u8] = b"This is a test\n";

fn cat() -> Result<(), Error> {
    let mut out = io::stdout();
    for path in env::args().skip(1) {
        let mut file = VFS::open(path, OpenFlags::R)?;
        let content = file.read_to_string()?;
        out.write_all(content.as_bytes())?;
    }
    Ok(())
}

fn reader() -> Result<(), Error> {
    let input = io::stdin().read_to_string()?;
    match input.as_bytes() == TEST_FILE {
        true => Ok(()),
        false => Err(Error::new(Code::InvArgs)),
    }
}

fn pipe_children(t: &mut dyn WvTester) {
    wv_assert_ok!(VFS::mount("/", "bootfs"));

    let mem = wv_assert_ok!(MemGate::new(0x1000, Perm::RW));
    let mut pipe = wv_assert_ok!(DirectPipe::new(&mem, 0x1000));

    let tile = wv_assert_ok!(Tile::get("compat"));
    let mut writer = wv_assert_ok!(ChildActivity::new(tile, "writer"));
    writer.add_mount("/", "/");
    writer.add_file(STDOUT_FILENO, wv_assert_some!(pipe.writer_fd()));
    let writer = wv_assert_ok!(writer.run_with_args(cat, &["cat", "/test.txt"]));

    let tile = wv_assert_ok!(Tile::get("compat"));
    let mut reader_act = wv_assert_ok!(ChildActivity::new(tile, "reader"));
    reader_act.add_file(STDIN_FILENO, wv_assert_some!(pipe.reader_fd()));
    let reader_act = wv_assert_ok!(reader_act.run(reader));

    // the children have their own ends now
    pipe.close_reader();
    pipe.close_writer();

    wv_assert_eq!(t, writer.wait(), Ok(Code::Success));
    wv_assert_eq!(t, reader_act.wait(), Ok(Code::Success));
    // the exit code stays available
    wv_assert_eq!(t, writer.wait(), Ok(Code::Success));
    wv_assert_eq!(t, reader_act.wait(), Ok(Code::Success));

    wv_assert_ok!(VFS::unmount("/"));
}

fn pipe_reader_gone(t: &mut dyn WvTester) {
    fn partial_reader() -> Result<(), Error> {
        let sem = Semaphore::bind(Activity::own().data_source().pop::<Selector>()?);
        let mut buf = [0u8; 4];
        io::stdin().read(&mut buf)?;
        sem.up()?;
        // leave the rest of the input in the pipe until we are killed
        loop {
            OwnActivity::sleep()?;
        }
    }

    wv_assert_ok!(VFS::mount("/", "bootfs"));

    let mem = wv_assert_ok!(MemGate::new(0x1000, Perm::RW));
    let mut pipe = wv_assert_ok!(DirectPipe::new(&mem, 0x1000));
    let sem = wv_assert_ok!(Semaphore::create(0));

    let tile = wv_assert_ok!(Tile::get("compat"));
    let mut writer = wv_assert_ok!(ChildActivity::new(tile, "writer"));
    writer.add_mount("/", "/");
    writer.add_file(STDOUT_FILENO, wv_assert_some!(pipe.writer_fd()));
    let writer = wv_assert_ok!(writer.run_with_args(cat, &["cat", "/test.txt"]));

    let tile = wv_assert_ok!(Tile::get("compat"));
    let mut reader_act = wv_assert_ok!(ChildActivity::new(tile, "reader"));
    reader_act.add_file(STDIN_FILENO, wv_assert_some!(pipe.reader_fd()));
    wv_assert_ok!(reader_act.delegate_obj(sem.sel()));
    reader_act.data_sink().push(sem.sel());
    let reader_act = wv_assert_ok!(reader_act.run(partial_reader));

    pipe.close_reader();
    pipe.close_writer();

    // kill the reader after it has started to read; the writer's EOF is never answered
    wv_assert_ok!(sem.down());
    drop(reader_act);

    wv_assert_eq!(t, writer.wait(), Ok(Code::Success));

    wv_assert_ok!(VFS::unmount("/"));
}

fn args_and_data(t: &mut dyn WvTester) {
    fn check() -> Result<(), Error> {
        let args = env::args().collect::<Vec<_>>();
        let val: u64 = Activity::own().data_source().pop()?;
        match args.as_slice() == ["prog", "--verbose", "x"] && val == 0x1234 {
            true => Ok(()),
            false => Err(Error::new(Code::InvArgs)),
        }
    }

    let tile = wv_assert_ok!(Tile::get("compat"));
    let mut act = wv_assert_ok!(ChildActivity::new(tile, "args"));
    act.data_sink().push(0x1234u64);
    let act = wv_assert_ok!(act.run_with_args(check, &["prog", "--verbose", "x"]));
    wv_assert_eq!(t, act.wait(), Ok(Code::Success));
}

fn exit_codes(t: &mut dyn WvTester) {
    let tile = wv_assert_ok!(Tile::get("compat"));
    let act = wv_assert_ok!(ChildActivity::new(tile, "fail"));
    let act = wv_assert_ok!(act.run(|| Err(Error::new(Code::NoSpace))));
    // the result arrives via upcall
    wv_assert_eq!(t, act.wait_async(1), Ok(Code::NoSpace));

    let tile = wv_assert_ok!(Tile::get("compat"));
    let act = wv_assert_ok!(ChildActivity::new(tile, "ok"));
    let act = wv_assert_ok!(act.run(|| Ok(())));
    wv_assert_eq!(t, act.wait(), Ok(Code::Success));
}

fn exec(t: &mut dyn WvTester) {
    let tile = wv_assert_ok!(Tile::get("compat"));
    let act = wv_assert_ok!(ChildActivity::new(tile, "exec"));
    wv_assert_err!(t, act.exec(&["/bin/cat"]).map(|_| ()), Code::NotSup);
}

fn program() -> Vec<u8> {
    let text = ProgramHeader {
        ty: PHType::Load.into(),
        flags: (PHFlags::R | PHFlags::X).bits(),
        offset: 0x100,
        virt_addr: (cfg::ENV_START + 0x800) as u64,
        file_size: 0x20,
        mem_size: 0x20,
        ..Default::default()
    };
    let bss = ProgramHeader {
        ty: PHType::Load.into(),
        flags: (PHFlags::R | PHFlags::W).bits(),
        offset: 0x120,
        virt_addr: (cfg::ENV_START + 0x1000) as u64,
        file_size: 0,
        mem_size: 0x40,
        ..Default::default()
    };

    let mut hdr = ElfHeader::default();
    hdr.ident[0..4].copy_from_slice(&MAGIC);
    hdr.entry = 0x1234;
    hdr.ph_off = size_of::<ElfHeader>() as u64;
    hdr.ph_entry_size = size_of::<ProgramHeader>() as u16;
    hdr.ph_num = 2;

    let mut bytes = util::object_to_bytes(&hdr).to_vec();
    bytes.extend_from_slice(util::object_to_bytes(&text));
    bytes.extend_from_slice(util::object_to_bytes(&bss));
    bytes.resize(0x100, 0);
    bytes.extend((0..0x20).map(|i| i as u8 + 1));
    bytes
}

fn loader(t: &mut dyn WvTester) {
    wv_assert_ok!(VFS::mount("/", "bootfs"));

    let tile = wv_assert_ok!(Tile::get("compat"));
    let act = wv_assert_ok!(ChildActivity::new(tile, "loader"));

    // pre-fill the bss with garbage to see that it gets zeroed
    let bss_addr = (cfg::ENV_START + 0x1000) as GlobOff;
    let bss = wv_assert_ok!(act.get_mem(bss_addr, 0x40, Perm::RW));
    wv_assert_ok!(bss.write(&[0xFFu8; 0x40], 0));

    let mut file = wv_assert_ok!(VFS::open("/prog", OpenFlags::RX));
    wv_assert_eq!(t, load_program(&act, &mut file), Ok(0x1234));

    let text = wv_assert_ok!(act.get_mem((cfg::ENV_START + 0x800) as GlobOff, 0x20, Perm::R));
    let mut buf = [0u8; 0x20];
    wv_assert_ok!(text.read(&mut buf, 0));
    wv_assert_eq!(t, buf.to_vec(), (1..=0x20).collect::<Vec<u8>>());

    let mut buf = [0xAAu8; 0x40];
    wv_assert_ok!(bss.read(&mut buf, 0));
    wv_assert_eq!(t, buf, [0u8; 0x40]);

    // no ELF at all
    let mut file = wv_assert_ok!(VFS::open("/junk", OpenFlags::R));
    wv_assert_err!(t, load_program(&act, &mut file), Code::InvalidElf);

    // outside of the activity's memory
    wv_assert_err!(
        t,
        act.get_mem(cfg::ENV_START as GlobOff, (cfg::ACT_REGION_SIZE + 1) as GlobOff, Perm::R),
        Code::InvArgs
    );

    wv_assert_ok!(VFS::unmount("/"));
}

fn activities() -> Result<(), Error> {
    let mut t = DefaultWvTester::default();
    wv_run_test!(t, pipe_children);
    wv_run_test!(t, pipe_reader_gone);
    wv_run_test!(t, args_and_data);
    wv_run_test!(t, exit_codes);
    wv_run_test!(t, exec);
    wv_run_test!(t, loader);
    t.result()
}

fn tile_exhaustion() -> Result<(), Error> {
    let mut t = DefaultWvTester::default();
    let desc = Activity::own().tile_desc();
    let first = wv_assert_ok!(Tile::new(desc));
    wv_assert_err!(t, Tile::new(desc).map(|_| ()), Code::NoFreeTile);

    // the tile is free again after the last reference is gone
    drop(first);
    wv_assert_ok!(Tile::new(desc));
    t.result()
}

#[test]
fn child_activities() {
    let cfg = MachineConfig::default()
        .boot_mod("test.txt", TEST_FILE)
        .boot_mod("prog", &program())
        .boot_mod("junk", &[0u8; 0x80]);
    assert_eq!(common::run_with(cfg, activities), Code::Success);
}

#[test]
fn no_free_tile() {
    let cfg = MachineConfig::default().tiles(2);
    assert_eq!(common::run_with(cfg, tile_exhaustion), Code::Success);
}

#[test]
fn failing_root() {
    fn root() -> Result<(), Error> {
        Err(Error::new(Code::NoSuchFile))
    }
    assert_eq!(common::run(root), Code::NoSuchFile);
}
