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

use m3::cap::{CapFlags, Selector};
use m3::cell::Cell;
use m3::com::{recv_msg, recv_reply, RGateArgs, RecvGate, SGateArgs, SendGate};
use m3::errors::{Code, Error};
use m3::kif::{CapRngDesc, CapType};
use m3::mem::MsgBuf;
use m3::rc::Rc;
use m3::test::{DefaultWvTester, WvTester};
use m3::tiles::{Activity, ChildActivity, OwnActivity, RunningActivity, Tile};
use m3::time::TimeDuration;
use m3::workloop::WorkLoop;
use m3::{build_vmsg, send_vmsg};
use m3::{wv_assert, wv_assert_eq, wv_assert_err, wv_assert_ok, wv_assert_some, wv_run_test};

fn message(val: u64) -> MsgBuf {
    let mut msg = MsgBuf::new();
    build_vmsg!(msg, val);
    msg
}

fn credits(t: &mut dyn WvTester) {
    // 16 slots of 64 bytes, but only two credits for the sender
    let rgate = wv_assert_ok!(RecvGate::new(10, 6));
    let reply_gate = wv_assert_ok!(RecvGate::new(10, 6));
    let sgate = wv_assert_ok!(SendGate::new_with(SGateArgs::new(&rgate).credits(2)));

    let msg = message(0xDEAD_BEEF);
    wv_assert_ok!(sgate.try_send(&msg, &reply_gate));
    wv_assert_ok!(sgate.try_send(&msg, &reply_gate));
    wv_assert_err!(t, sgate.try_send(&msg, &reply_gate), Code::MissCredits);
    wv_assert_eq!(t, sgate.credits(), Ok(0));
    wv_assert_eq!(t, sgate.can_send(), Ok(false));

    // the reply gives the credit back
    let req = wv_assert_some!(rgate.fetch());
    wv_assert_ok!(rgate.reply(&message(1), req));
    wv_assert_eq!(t, sgate.credits(), Ok(1));
    wv_assert_ok!(sgate.try_send(&msg, &reply_gate));

    let mut reply = wv_assert_ok!(recv_msg(&reply_gate));
    wv_assert_eq!(t, reply.pop::<u64>(), Ok(1));

    let mut req = wv_assert_ok!(recv_msg(&rgate));
    wv_assert_eq!(t, req.label(), 0);
    wv_assert_eq!(t, req.pop::<u64>(), Ok(0xDEAD_BEEF));
}

fn labels(t: &mut dyn WvTester) {
    let rgate = wv_assert_ok!(RecvGate::new(8, 6));
    let reply_gate = wv_assert_ok!(RecvGate::new(8, 6));
    let sg1 = wv_assert_ok!(SendGate::new_with(SGateArgs::new(&rgate).label(0x1234)));
    let sg2 = wv_assert_ok!(SendGate::new_with(SGateArgs::new(&rgate).label(0x5678)));

    wv_assert_ok!(send_vmsg!(&sg1, &reply_gate, 1u64));
    wv_assert_ok!(send_vmsg!(&sg2, &reply_gate, 2u64));

    let mut is = wv_assert_ok!(recv_msg(&rgate));
    wv_assert_eq!(t, is.label(), 0x1234);
    wv_assert_eq!(t, is.pop::<u64>(), Ok(1));
    wv_assert_err!(t, is.pop::<u64>(), Code::InvArgs);

    let mut is = wv_assert_ok!(recv_msg(&rgate));
    wv_assert_eq!(t, is.label(), 0x5678);
    wv_assert_eq!(t, is.pop::<u64>(), Ok(2));
}

fn drop_msgs(t: &mut dyn WvTester) {
    let rgate = wv_assert_ok!(RecvGate::new(8, 6));
    let reply_gate = wv_assert_ok!(RecvGate::new(8, 6));
    let sg1 = wv_assert_ok!(SendGate::new_with(SGateArgs::new(&rgate).label(1)));
    let sg2 = wv_assert_ok!(SendGate::new_with(SGateArgs::new(&rgate).label(2)));

    wv_assert_ok!(send_vmsg!(&sg1, &reply_gate, 10u64));
    wv_assert_ok!(send_vmsg!(&sg2, &reply_gate, 20u64));
    wv_assert_ok!(send_vmsg!(&sg1, &reply_gate, 11u64));

    rgate.drop_msgs_with(1);

    let mut is = wv_assert_ok!(recv_msg(&rgate));
    wv_assert_eq!(t, is.label(), 2);
    wv_assert_eq!(t, is.pop::<u64>(), Ok(20));
    drop(is);
    wv_assert!(t, !rgate.has_msgs());
}

fn reply_to_revoked_sender(t: &mut dyn WvTester) {
    let rgate = wv_assert_ok!(RecvGate::new(10, 6));
    let reply_gate = wv_assert_ok!(RecvGate::new(8, 6));
    let sgate = wv_assert_ok!(SendGate::new_with(SGateArgs::new(&rgate).credits(1)));

    let mut msg = MsgBuf::new();
    build_vmsg!(msg, 1u64, 2u64, 3u64, 4u64);
    wv_assert_ok!(sgate.send(&msg, &reply_gate));

    // the sender is gone before the receiver replies
    drop(sgate);

    let req = wv_assert_some!(rgate.fetch());
    wv_assert_ok!(rgate.reply(&message(42), req));

    let mut reply = wv_assert_ok!(recv_msg(&reply_gate));
    wv_assert_eq!(t, reply.pop::<u64>(), Ok(42));
}

fn receive_from_revoked(t: &mut dyn WvTester) {
    let rgate = wv_assert_ok!(RecvGate::new(8, 6));
    let reply_gate = wv_assert_ok!(RecvGate::new(8, 6));
    let sgate = wv_assert_ok!(SendGate::new_with(
        SGateArgs::new(&rgate).credits(1).flags(CapFlags::KEEP_CAP)
    ));

    wv_assert_ok!(send_vmsg!(&sgate, &reply_gate, 7u64));
    wv_assert!(t, sgate.is_connected());

    let crd = CapRngDesc::new(CapType::Object, sgate.sel(), 1);
    wv_assert_ok!(Activity::own().revoke(crd, false));
    wv_assert!(t, !sgate.is_connected());

    wv_assert_err!(
        t,
        recv_reply(&reply_gate, Some(&sgate)).map(|_| ()),
        Code::RecvGone
    );
    wv_assert_err!(
        t,
        sgate.try_send(&message(8), &reply_gate),
        Code::NotConnected
    );

    // neither the request nor anything else has been acknowledged
    wv_assert!(t, rgate.has_msgs());
    wv_assert!(t, !reply_gate.has_msgs());
    let mut req = wv_assert_ok!(recv_msg(&rgate));
    wv_assert_eq!(t, req.pop::<u64>(), Ok(7));
}

fn receive_while_revoked(t: &mut dyn WvTester) {
    // hands out a send gate of its own and revokes it after a while
    fn lender() -> Result<(), Error> {
        let notify = SendGate::new_bind(Activity::own().data_source().pop::<Selector>()?);
        let rgate = RecvGate::new(8, 6)?;
        let sgate = SendGate::new(&rgate)?;
        send_vmsg!(&notify, Activity::own().def_rgate(), sgate.sel())?;

        OwnActivity::sleep_for(TimeDuration::from_millis(20))?;
        // revokes the obtained copy as well
        drop(sgate);
        Ok(())
    }

    let rgate = wv_assert_ok!(RecvGate::new(8, 6));
    let notify = wv_assert_ok!(SendGate::new(&rgate));

    let tile = wv_assert_ok!(Tile::get("compat"));
    let mut act = wv_assert_ok!(ChildActivity::new(tile, "lender"));
    wv_assert_ok!(act.delegate_obj(notify.sel()));
    act.data_sink().push(notify.sel());
    let act = wv_assert_ok!(act.run(lender));

    let child_sel = {
        let mut msg = wv_assert_ok!(recv_msg(&rgate));
        wv_assert_ok!(msg.pop::<Selector>())
    };
    let sel = wv_assert_ok!(act.activity().obtain_obj(child_sel));
    let sgate = SendGate::new_bind(sel);

    let reply_gate = wv_assert_ok!(RecvGate::new(8, 6));
    wv_assert_ok!(send_vmsg!(&sgate, &reply_gate, 1u64));
    // nobody replies; we wake up when the lender revokes the gate
    wv_assert_err!(
        t,
        recv_reply(&reply_gate, Some(&sgate)).map(|_| ()),
        Code::RecvGone
    );
    wv_assert!(t, !sgate.is_connected());
    wv_assert!(t, !reply_gate.has_msgs());

    wv_assert_eq!(t, act.wait(), Ok(Code::Success));
}

fn workloop_sleeps_after_invalidation(t: &mut dyn WvTester) {
    // invalidates the sender of the parent by deactivating its receive gate, then stops the
    // parent's workloop by a message
    fn invalidator() -> Result<(), Error> {
        let mut src = Activity::own().data_source();
        let stop = SendGate::new_bind(src.pop::<Selector>()?);
        let rgate = RecvGate::new_bind(src.pop::<Selector>()?, 8, 6)?;
        send_vmsg!(&stop, Activity::own().def_rgate(), 0u64)?;

        OwnActivity::sleep_for(TimeDuration::from_millis(20))?;
        rgate.deactivate();

        OwnActivity::sleep_for(TimeDuration::from_millis(20))?;
        send_vmsg!(&stop, Activity::own().def_rgate(), 1u64)?;
        Ok(())
    }

    let wl_gate = Rc::new(wv_assert_ok!(RecvGate::new(8, 6)));
    let stop = wv_assert_ok!(SendGate::new(&wl_gate));
    let lent = wv_assert_ok!(RecvGate::new_inactive(
        RGateArgs::default().order(8).msg_order(6)
    ));

    let tile = wv_assert_ok!(Tile::get("compat"));
    let mut act = wv_assert_ok!(ChildActivity::new(tile, "invalidator"));
    wv_assert_ok!(act.delegate_obj(stop.sel()));
    wv_assert_ok!(act.delegate_obj(lent.sel()));
    {
        let mut sink = act.data_sink();
        sink.push(stop.sel());
        sink.push(lent.sel());
    }
    let act = wv_assert_ok!(act.run(invalidator));

    // wait until the child has activated the gate and connect to it
    {
        let mut msg = wv_assert_ok!(recv_msg(&wl_gate));
        wv_assert_eq!(t, msg.pop::<u64>(), Ok(0));
    }
    let sgate = wv_assert_ok!(SendGate::new(&lent));
    let reply_gate = wv_assert_ok!(RecvGate::new(8, 6));
    wv_assert_ok!(send_vmsg!(&sgate, &reply_gate, 1u64));
    wv_assert!(t, sgate.is_connected());

    let wl = Rc::new(WorkLoop::new());
    let passes = Rc::new(Cell::new(0));
    let p = passes.clone();
    wl.add(Rc::new(move || {
        p.set(p.get() + 1);
        Ok(false)
    }));
    let weak_wl = Rc::downgrade(&wl);
    wv_assert_ok!(wl_gate.start(&wl, move |is| {
        if is.pop::<u64>()? == 1 {
            if let Some(wl) = weak_wl.upgrade() {
                wl.stop();
            }
        }
        Ok(())
    }));
    wv_assert_ok!(wl.run());

    // one pass per wakeup: start, invalidation and the stop message
    wv_assert!(t, !sgate.is_connected());
    wv_assert!(t, passes.get() <= 4);
    wv_assert_eq!(t, act.wait(), Ok(Code::Success));
}

fn rgate_orders(t: &mut dyn WvTester) {
    wv_assert_err!(t, RecvGate::new(70, 6).map(|_| ()), Code::InvArgs);
    wv_assert_err!(t, RecvGate::new(6, 8).map(|_| ()), Code::InvArgs);
    wv_assert_err!(
        t,
        RecvGate::new_inactive(RGateArgs::default().order(6).msg_order(72)).map(|_| ()),
        Code::InvArgs
    );
    wv_assert_ok!(RecvGate::new(6, 6));
}

fn msgs() -> Result<(), Error> {
    let mut t = DefaultWvTester::default();
    wv_run_test!(t, credits);
    wv_run_test!(t, labels);
    wv_run_test!(t, drop_msgs);
    wv_run_test!(t, reply_to_revoked_sender);
    wv_run_test!(t, receive_from_revoked);
    wv_run_test!(t, receive_while_revoked);
    wv_run_test!(t, workloop_sleeps_after_invalidation);
    wv_run_test!(t, rgate_orders);
    t.result()
}

#[test]
fn message_passing() {
    assert_eq!(common::run(msgs), Code::Success);
}
