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

use base::build_vmsg;
use base::errors::{Code, Error, VerboseError};
use base::io::LogFlags;
use base::kif::{self, service, syscalls, CapRngDesc, CapType};
use base::log;
use base::mem::MsgBuf;
use base::rc::Rc;
use base::serialize::M3Deserializer;
use base::tcu::{ActId, Message};

use crate::cap::CapRef;
use crate::com::{self, PendingOp, Service};
use crate::ktcu;
use crate::state::Kernel;
use crate::syscalls::{get_request, reply_result, reply_success, send_reply};

/// Clones the capabilities `src_crd` of `src` into `dst` at `dst_start`, skipping empty slots
fn clone_caps(
    k: &mut Kernel,
    src: ActId,
    src_crd: CapRngDesc,
    dst: ActId,
    dst_start: kif::CapSel,
) -> Result<(), Error> {
    for i in 0..src_crd.count() {
        let src_ref = CapRef::new(src, src_crd.start() + i);
        if k.caps.get(src_ref.act, src_ref.sel).is_some() {
            k.clone_cap(CapRef::new(dst, dst_start + i), src_ref)?;
        }
    }
    Ok(())
}

pub fn exchange(k: &mut Kernel, act: ActId, msg: &'static Message) -> Result<(), VerboseError> {
    let r: syscalls::Exchange = get_request(msg)?;
    sysc_log!(
        act,
        "exchange(act={}, own={:?}, other={}, obtain={})",
        r.act,
        r.own,
        r.other,
        r.obtain
    );

    let other = get_kobj!(k, act, r.act, Activity);
    if other == act {
        sysc_err!(Code::InvArgs, "Cannot exchange with oneself");
    }
    if !k.acts.contains_key(&other) {
        sysc_err!(Code::ActivityGone, "Activity {} is gone", other);
    }

    let other_crd = CapRngDesc::new(r.own.cap_type(), r.other, r.own.count());
    let (src, src_crd, dst, dst_crd) = if r.obtain {
        (other, other_crd, act, r.own)
    }
    else {
        (act, r.own, other, other_crd)
    };

    if !k.caps.range_unused(dst, &dst_crd) {
        sysc_err!(Code::InvArgs, "Selectors {:?} already in use", dst_crd);
    }

    clone_caps(k, src, src_crd, dst, dst_crd.start())?;

    reply_success(msg);
    Ok(())
}

pub fn exchange_sess(
    k: &mut Kernel,
    act: ActId,
    msg: &'static Message,
    obtain: bool,
) -> Result<(), VerboseError> {
    let r: syscalls::ExchangeSess = get_request(msg)?;
    sysc_log!(
        act,
        "{}(act={}, sess={}, crd={:?}, args={:?})",
        if obtain { "obtain" } else { "delegate" },
        r.act,
        r.sess,
        r.crd,
        r.args.words()
    );

    let target = get_kobj!(k, act, r.act, Activity);
    let sess = get_kobj!(k, act, r.sess, Sess);
    if obtain && !k.caps.range_unused(target, &r.crd) {
        sysc_err!(Code::InvArgs, "Selectors {:?} already in use", r.crd);
    }

    let data = service::ExchangeData {
        caps: CapRngDesc::new(CapType::Object, 0, r.crd.count()),
        args: r.args,
    };
    let mut smsg = MsgBuf::new();
    if obtain {
        build_vmsg!(smsg, service::Request::Obtain {
            sid: sess.ident(),
            data
        });
    }
    else {
        build_vmsg!(smsg, service::Request::Delegate {
            sid: sess.ident(),
            data
        });
    }

    let srv = sess.service().clone();
    com::send_request(k, smsg, PendingOp::Exchange {
        srv,
        act,
        target,
        crd: r.crd,
        obtain,
        msg,
    })?;

    // the reply is sent as soon as the service answered
    Ok(())
}

/// Finishes the capability exchange with `srv` that `act` started
#[allow(clippy::too_many_arguments)]
pub fn finish_exchange_sess(
    k: &mut Kernel,
    srv: &Rc<Service>,
    act: ActId,
    target: ActId,
    crd: CapRngDesc,
    obtain: bool,
    msg: &'static Message,
    reply: Result<&'static Message, Error>,
) {
    if !k.acts.contains_key(&act) {
        ktcu::ack_msg(ktcu::KSYS_EP, msg);
        return;
    }

    let res = reply.and_then(|rmsg| {
        let mut de = M3Deserializer::new(rmsg.as_words());
        let reply: service::ExchangeReply = de.pop()?;
        Result::<(), Error>::from(reply.res)?;

        let srv_crd = reply.data.caps;
        if srv_crd.count() > crd.count() {
            log!(
                LogFlags::KernServ,
                "{} returned {} caps, but only {} were requested",
                srv.name(),
                srv_crd.count(),
                crd.count()
            );
            return Err(Error::new(Code::InvArgs));
        }
        if !k.acts.contains_key(&target) {
            return Err(Error::new(Code::ActivityGone));
        }

        let owner = srv.owner();
        if obtain {
            clone_caps(k, owner, srv_crd, target, crd.start())?;
        }
        else {
            if !k.caps.range_unused(owner, &srv_crd) {
                return Err(Error::new(Code::InvArgs));
            }
            let src_crd = CapRngDesc::new(crd.cap_type(), crd.start(), srv_crd.count());
            clone_caps(k, target, src_crd, owner, srv_crd.start())?;
        }
        Ok(reply.data.args)
    });

    match res {
        Ok(args) => {
            let mut kreply = MsgBuf::new();
            build_vmsg!(kreply, Code::Success, syscalls::ExchangeSessReply { args });
            send_reply(msg, &kreply);
        },
        Err(e) => {
            log!(
                LogFlags::Error,
                "\x1B[37;41m{}: exchange with {} failed: {:?}\x1B[0m",
                act,
                srv.name(),
                e.code()
            );
            reply_result(msg, e.code());
        },
    }
}

pub fn revoke(k: &mut Kernel, act: ActId, msg: &'static Message) -> Result<(), VerboseError> {
    let r: syscalls::Revoke = get_request(msg)?;
    sysc_log!(act, "revoke(act={}, crd={:?}, own={})", r.act, r.crd, r.own);

    let target = get_kobj!(k, act, r.act, Activity);
    if r.own && r.crd.count() > 0 && r.crd.start() < kif::FIRST_FREE_SEL {
        sysc_err!(Code::InvArgs, "Cap 0, 1, and 2 are not revocable");
    }

    k.revoke(target, r.crd, r.own)?;

    reply_success(msg);
    Ok(())
}
