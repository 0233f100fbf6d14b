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

use num_enum::{IntoPrimitive, TryFromPrimitive};

use m3::cap::Selector;
use m3::cell::RefCell;
use m3::client::ClientSession;
use m3::col::String;
use m3::com::{recv_msg, RecvGate, SGateArgs, SendGate, Semaphore};
use m3::errors::{Code, Error};
use m3::rc::Rc;
use m3::server::{ExcType, RequestHandler, RequestSession, Server, ServerSession, SessId};
use m3::test::{DefaultWvTester, WvTester};
use m3::tiles::{Activity, ChildActivity, RunningActivity, Tile};
use m3::workloop::WorkLoop;
use m3::{reply_vmsg, send_recv, send_vmsg};
use m3::{wv_assert, wv_assert_eq, wv_assert_err, wv_assert_ok, wv_run_test};

#[derive(Copy, Clone, Debug, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
enum EchoOp {
    Echo,
    Count,
    Notify,
    Quit,
}

#[derive(Debug)]
struct EchoSession {
    _serv: ServerSession,
    prefix: String,
    requests: u64,
    notify: Option<SendGate>,
}

impl RequestSession for EchoSession {
    fn new(serv: ServerSession, arg: &str) -> Result<Self, Error> {
        Ok(EchoSession {
            _serv: serv,
            prefix: String::from(arg),
            requests: 0,
            notify: None,
        })
    }
}

fn echo_server() -> Result<(), Error> {
    let sem_sel: Selector = Activity::own().data_source().pop()?;
    let sem = Semaphore::bind(sem_sel);

    let wl = Rc::new(WorkLoop::new());
    let hdl = Rc::new(RefCell::new(RequestHandler::<EchoSession, EchoOp>::new()?));
    let srv = Server::new("echo", &mut *hdl.borrow_mut())?;

    {
        let mut hdl = hdl.borrow_mut();
        hdl.reg_msg_handler(EchoOp::Echo, |sess, is| {
            let val: u64 = is.pop()?;
            let msg: String = is.pop()?;
            sess.requests += 1;
            let mut reply = sess.prefix.clone();
            reply.push_str(&msg);
            reply_vmsg!(is, Code::Success, val, reply)
        });
        hdl.reg_msg_handler(EchoOp::Count, |sess, is| {
            reply_vmsg!(is, Code::Success, sess.requests)
        });
        hdl.reg_msg_handler(EchoOp::Notify, |sess, is| {
            let val: u64 = is.pop()?;
            let sgate = sess.notify.as_ref().ok_or_else(|| Error::new(Code::NotConnected))?;
            send_vmsg!(sgate, Activity::own().def_rgate(), val)?;
            is.reply_error(Code::Success)
        });
        let wl_ref = Rc::downgrade(&wl);
        hdl.reg_msg_handler(EchoOp::Quit, move |_sess, is| {
            if let Some(wl) = wl_ref.upgrade() {
                wl.stop();
            }
            is.reply_error(Code::Success)
        });

        // the client hands us a send gate for notifications
        hdl.reg_cap_handler(EchoOp::Notify, ExcType::Del(1), |clients, sid, xchg| {
            let sel = Activity::own().alloc_sel();
            xchg.out_caps(m3::kif::CapRngDesc::new(m3::kif::CapType::Object, sel, 1));
            let sess = clients
                .get_mut(sid)
                .ok_or_else(|| Error::new(Code::InvArgs))?;
            sess.notify = Some(SendGate::new_owned_bind(sel));
            Ok(())
        });
    }

    // tell the parent that the service exists
    sem.up()?;

    RequestHandler::run(&hdl, &srv, &wl)
}

fn start_server(sem: &Semaphore) -> impl RunningActivity {
    let tile = wv_assert_ok!(Tile::get("compat"));
    let mut act = wv_assert_ok!(ChildActivity::new(tile, "echo"));
    wv_assert_ok!(act.delegate_obj(sem.sel()));
    act.data_sink().push(sem.sel());

    let act = wv_assert_ok!(act.run(echo_server));
    wv_assert_ok!(sem.down());
    act
}

fn quit(t: &mut dyn WvTester, sgate: &SendGate) {
    let rgate = Activity::own().def_rgate();
    let mut reply = wv_assert_ok!(send_recv!(sgate, rgate, u64::from(EchoOp::Quit)));
    wv_assert_eq!(t, reply.pop::<Code>(), Ok(Code::Success));
}

fn echo(t: &mut dyn WvTester) {
    let sem = wv_assert_ok!(Semaphore::create(0));
    let srv = start_server(&sem);

    let sess = wv_assert_ok!(ClientSession::new("echo"));
    let sgate = wv_assert_ok!(sess.connect());
    let rgate = Activity::own().def_rgate();

    let mut reply = wv_assert_ok!(send_recv!(
        &sgate,
        rgate,
        u64::from(EchoOp::Echo),
        42u64,
        "hello"
    ));
    wv_assert_eq!(t, reply.pop::<Code>(), Ok(Code::Success));
    wv_assert_eq!(t, reply.pop::<u64>(), Ok(42));
    wv_assert_eq!(t, reply.pop::<String>(), Ok(String::from("hello")));
    drop(reply);

    // unknown opcodes are answered with an error
    let mut reply = wv_assert_ok!(send_recv!(&sgate, rgate, 17u64));
    wv_assert_eq!(t, reply.pop::<Code>(), Ok(Code::InvArgs));
    drop(reply);

    let mut reply = wv_assert_ok!(send_recv!(&sgate, rgate, u64::from(EchoOp::Count)));
    wv_assert_eq!(t, reply.pop::<Code>(), Ok(Code::Success));
    wv_assert_eq!(t, reply.pop::<u64>(), Ok(1));
    drop(reply);

    quit(t, &sgate);
    wv_assert_eq!(t, srv.wait(), Ok(Code::Success));
}

fn sessions(t: &mut dyn WvTester) {
    let sem = wv_assert_ok!(Semaphore::create(0));
    let srv = start_server(&sem);
    let rgate = Activity::own().def_rgate();

    wv_assert_err!(t, ClientSession::new("unknown"), Code::NotFound);

    let sess1 = wv_assert_ok!(ClientSession::new_with_arg("echo", "1:"));
    let sess2 = wv_assert_ok!(ClientSession::new_with_arg("echo", "2:"));
    let sg1 = wv_assert_ok!(sess1.connect());
    let sg2 = wv_assert_ok!(sess2.connect());
    // only one connection per session
    wv_assert_err!(t, sess1.connect(), Code::NoSpace);

    // the label of the connection selects the session
    let mut reply = wv_assert_ok!(send_recv!(&sg2, rgate, u64::from(EchoOp::Echo), 1u64, "a"));
    wv_assert_eq!(t, reply.pop::<Code>(), Ok(Code::Success));
    wv_assert_eq!(t, reply.pop::<u64>(), Ok(1));
    wv_assert_eq!(t, reply.pop::<String>(), Ok(String::from("2:a")));
    drop(reply);

    let mut reply = wv_assert_ok!(send_recv!(&sg1, rgate, u64::from(EchoOp::Echo), 2u64, "b"));
    wv_assert_eq!(t, reply.pop::<Code>(), Ok(Code::Success));
    wv_assert_eq!(t, reply.pop::<u64>(), Ok(2));
    wv_assert_eq!(t, reply.pop::<String>(), Ok(String::from("1:b")));
    drop(reply);

    // closing the first session revokes its connection
    drop(sg1);
    drop(sess1);

    quit(t, &sg2);
    wv_assert_eq!(t, srv.wait(), Ok(Code::Success));
}

fn delegate(t: &mut dyn WvTester) {
    let sem = wv_assert_ok!(Semaphore::create(0));
    let srv = start_server(&sem);

    let sess = wv_assert_ok!(ClientSession::new("echo"));
    let sgate = wv_assert_ok!(sess.connect());
    let rgate = Activity::own().def_rgate();

    // notifications arrive at a separate gate
    let notify_rgate = wv_assert_ok!(RecvGate::new(8, 6));
    let notify_sgate = wv_assert_ok!(SendGate::new_with(
        SGateArgs::new(&notify_rgate).credits(1)
    ));

    // wrong number of capabilities
    let crd = m3::kif::CapRngDesc::new(m3::kif::CapType::Object, notify_sgate.sel(), 2);
    wv_assert_err!(
        t,
        sess.delegate(crd, |os| os.push(u64::from(EchoOp::Notify)), |_| Ok(())),
        Code::InvArgs
    );

    wv_assert_ok!(sess.delegate(
        m3::kif::CapRngDesc::new(m3::kif::CapType::Object, notify_sgate.sel(), 1),
        |os| os.push(u64::from(EchoOp::Notify)),
        |_| Ok(())
    ));

    let mut reply = wv_assert_ok!(send_recv!(&sgate, rgate, u64::from(EchoOp::Notify), 99u64));
    wv_assert_eq!(t, reply.pop::<Code>(), Ok(Code::Success));
    drop(reply);

    let mut msg = wv_assert_ok!(recv_msg(&notify_rgate));
    wv_assert_eq!(t, msg.pop::<u64>(), Ok(99));
    drop(msg);

    // obtaining something else than the connection is not supported
    wv_assert!(t, sess.obtain_crd(2).is_err());

    quit(t, &sgate);
    wv_assert_eq!(t, srv.wait(), Ok(Code::Success));
}

fn session_outlives_server(t: &mut dyn WvTester) {
    let sem = wv_assert_ok!(Semaphore::create(0));
    let srv = start_server(&sem);

    let sess = wv_assert_ok!(ClientSession::new("echo"));
    let sgate = wv_assert_ok!(sess.connect());
    quit(t, &sgate);
    wv_assert_eq!(t, srv.wait(), Ok(Code::Success));
    // removing the server revokes its sessions
    drop(srv);

    let rmng = wv_assert_ok!(Activity::own().resmng());
    wv_assert_ok!(rmng.close_sess(sess.sel()));

    // other capabilities are still refused
    let rgate = wv_assert_ok!(RecvGate::new(8, 6));
    let other = wv_assert_ok!(SendGate::new(&rgate));
    wv_assert_err!(t, rmng.close_sess(other.sel()), Code::InvArgs);
}

fn server() -> Result<(), Error> {
    let mut t = DefaultWvTester::default();
    wv_run_test!(t, echo);
    wv_run_test!(t, sessions);
    wv_run_test!(t, delegate);
    wv_run_test!(t, session_outlives_server);
    t.result()
}

#[test]
fn request_handler() {
    assert_eq!(common::run(server), Code::Success);
}

#[test]
fn session_container_sizes() {
    use m3::server::{SessionContainer, MAX_SESSIONS};

    let mut con = SessionContainer::<u32>::new(MAX_SESSIONS + 10);
    assert_eq!(con.capacity(), MAX_SESSIONS);
    let sid: SessId = con.next_id().unwrap();
    con.add(sid, 7).unwrap();
    assert_eq!(con.get(sid), Some(&7));
}
