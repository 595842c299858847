// Manual continuation driving: suspension, restoration, and observable
// side-effect order, with no scheduler involved.

use weft::names::MethodSig;
use weft::proc::{
    ArithOp, CmpOp, Cond, Const, DispatchKind, Module, Op, ProcBuilder, ProcFlags, ValueKind,
};
use weft::rt::{Continuation, RtEnv};
use weft::WeftError;

use crate::common;

#[test]
fn yields_preserve_side_effect_order() {
    let mut m = Module::new();
    let p = common::prims(&mut m);
    let io = common::printers(&mut m);
    let entry = m.method("demo/C", "run", MethodSig::void());
    m.insert(
        ProcBuilder::new(entry, ProcFlags::statik())
            .push_int(1)
            .call(io.print_int, DispatchKind::Static)
            .call(p.yield_, DispatchKind::Static)
            .push_int(2)
            .call(io.print_int, DispatchKind::Static)
            .call(p.yield_, DispatchKind::Static)
            .push_int(3)
            .call(io.print_int, DispatchKind::Static)
            .ret(None)
            .build()
            .unwrap(),
    );
    common::instrument_standard(&mut m).unwrap();

    let mut env = RtEnv::new(m);
    weft::sched::install_primitives(&mut env);
    let io2 = common::printers(&mut env.module);
    let trace = common::install_printers(&mut env, &io2);

    let mut cont = Continuation::new(entry, None);
    let suspensions = common::drive(&env, &mut cont).unwrap();

    assert_eq!(suspensions, 2);
    assert!(cont.is_done());
    assert_eq!(common::snapshot(&trace), vec!["1", "2", "3"]);
}

#[test]
fn woven_resume_matches_straight_run() {
    // The same program, once instrumented and driven through two
    // suspensions, once left alone (park degrades to a no-op off the
    // scheduler): identical observable output.
    let build = |m: &mut Module| {
        let p = common::prims(m);
        let io = common::printers(m);
        let entry = m.method("demo/C", "run", MethodSig::void());
        m.insert(
            ProcBuilder::new(entry, ProcFlags::statik())
                .push_int(7)
                .call(io.print_int, DispatchKind::Static)
                .call(p.park, DispatchKind::Static)
                .push_int(8)
                .call(io.print_int, DispatchKind::Static)
                .call(p.park, DispatchKind::Static)
                .push_int(9)
                .call(io.print_int, DispatchKind::Static)
                .ret(None)
                .build()
                .unwrap(),
        );
        entry
    };

    let run = |instrumented: bool| -> (usize, Vec<String>) {
        let mut m = Module::new();
        let entry = build(&mut m);
        if instrumented {
            common::instrument_standard(&mut m).unwrap();
        }
        let mut env = RtEnv::new(m);
        weft::sched::install_primitives(&mut env);
        let io = common::printers(&mut env.module);
        let trace = common::install_printers(&mut env, &io);
        let mut cont = Continuation::new(entry, None);
        let n = common::drive(&env, &mut cont).unwrap();
        (n, common::snapshot(&trace))
    };

    let (n_woven, woven_trace) = run(true);
    let (n_plain, plain_trace) = run(false);
    assert_eq!(n_woven, 2);
    assert_eq!(n_plain, 0);
    assert_eq!(woven_trace, plain_trace);
    assert_eq!(woven_trace, vec!["7", "8", "9"]);
}

#[test]
fn call_chain_restores_into_the_callee() {
    // outer calls inner; inner parks, later returns 21; outer doubles it.
    let mut m = Module::new();
    let p = common::prims(&mut m);
    let io = common::printers(&mut m);
    let inner = m.method("demo/C", "inner", MethodSig::new(vec![], Some(ValueKind::Int)));
    m.insert(
        ProcBuilder::new(inner, ProcFlags::statik())
            .call(p.park, DispatchKind::Static)
            .push_int(21)
            .ret(Some(ValueKind::Int))
            .build()
            .unwrap(),
    );
    let outer = m.method("demo/C", "outer", MethodSig::void());
    m.insert(
        ProcBuilder::new(outer, ProcFlags::statik())
            .call(inner, DispatchKind::Static)
            .push_int(2)
            .arith(ValueKind::Int, ArithOp::Mul)
            .call(io.print_int, DispatchKind::Static)
            .ret(None)
            .build()
            .unwrap(),
    );
    common::instrument_standard(&mut m).unwrap();

    let mut env = RtEnv::new(m);
    weft::sched::install_primitives(&mut env);
    let io2 = common::printers(&mut env.module);
    let trace = common::install_printers(&mut env, &io2);

    let mut cont = Continuation::new(outer, None);
    assert_eq!(common::drive(&env, &mut cont).unwrap(), 1);
    assert_eq!(common::snapshot(&trace), vec!["42"]);
}

#[test]
fn live_operand_stack_survives_suspension() {
    let mut m = Module::new();
    let p = common::prims(&mut m);
    let io = common::printers(&mut m);
    let entry = m.method("demo/C", "run", MethodSig::void());
    m.insert(
        ProcBuilder::new(entry, ProcFlags::statik())
            .push_int(10)
            .push_int(20)
            .call(p.yield_, DispatchKind::Static)
            .arith(ValueKind::Int, ArithOp::Add)
            .call(io.print_int, DispatchKind::Static)
            .ret(None)
            .build()
            .unwrap(),
    );
    common::instrument_standard(&mut m).unwrap();

    let mut env = RtEnv::new(m);
    weft::sched::install_primitives(&mut env);
    let io2 = common::printers(&mut env.module);
    let trace = common::install_printers(&mut env, &io2);

    let mut cont = Continuation::new(entry, None);
    common::drive(&env, &mut cont).unwrap();
    assert_eq!(common::snapshot(&trace), vec!["30"]);
}

#[test]
fn locals_survive_repeated_suspensions() {
    // Countdown with a park in the loop body: 3, 2, 1.
    let mut m = Module::new();
    let p = common::prims(&mut m);
    let io = common::printers(&mut m);
    let entry = m.method("demo/C", "count", MethodSig::void());
    let mut b = ProcBuilder::new(entry, ProcFlags::statik());
    let head = b.fresh_label();
    let done = b.fresh_label();
    m.insert(
        b.push_int(3)
            .store(ValueKind::Int, 0)
            .bind(head)
            .load(ValueKind::Int, 0)
            .branch(Cond::IfZero, done)
            .load(ValueKind::Int, 0)
            .call(io.print_int, DispatchKind::Static)
            .call(p.park, DispatchKind::Static)
            .load(ValueKind::Int, 0)
            .push_int(1)
            .arith(ValueKind::Int, ArithOp::Sub)
            .store(ValueKind::Int, 0)
            .jump(head)
            .bind(done)
            .ret(None)
            .build()
            .unwrap(),
    );
    common::instrument_standard(&mut m).unwrap();

    let mut env = RtEnv::new(m);
    weft::sched::install_primitives(&mut env);
    let io2 = common::printers(&mut env.module);
    let trace = common::install_printers(&mut env, &io2);

    let mut cont = Continuation::new(entry, None);
    assert_eq!(common::drive(&env, &mut cont).unwrap(), 3);
    assert_eq!(common::snapshot(&trace), vec!["3", "2", "1"]);
}

#[test]
fn long_lane_round_trips_through_suspension() {
    let mut m = Module::new();
    let p = common::prims(&mut m);
    let io = common::printers(&mut m);
    let entry = m.method("demo/C", "longs", MethodSig::void());
    let mut b = ProcBuilder::new(entry, ProcFlags::statik());
    let bad = b.fresh_label();
    m.insert(
        b.push(Const::Long(7_000_000_000))
            .store(ValueKind::Long, 0)
            .call(p.yield_, DispatchKind::Static)
            .load(ValueKind::Long, 0)
            .push(Const::Long(7_000_000_000))
            .cmp(ValueKind::Long, CmpOp::Eq)
            .branch(Cond::IfZero, bad)
            .push(Const::Str("ok".into()))
            .call(io.print, DispatchKind::Static)
            .ret(None)
            .bind(bad)
            .push(Const::Str("bad".into()))
            .call(io.print, DispatchKind::Static)
            .ret(None)
            .build()
            .unwrap(),
    );
    common::instrument_standard(&mut m).unwrap();

    let mut env = RtEnv::new(m);
    weft::sched::install_primitives(&mut env);
    let io2 = common::printers(&mut env.module);
    let trace = common::install_printers(&mut env, &io2);

    let mut cont = Continuation::new(entry, None);
    common::drive(&env, &mut cont).unwrap();
    assert_eq!(common::snapshot(&trace), vec!["ok"]);
}

#[test]
fn pending_allocation_is_rebuilt_on_resume() {
    let mut m = Module::new();
    let p = common::prims(&mut m);
    let io = common::printers(&mut m);
    let cls = m.names.intern("demo/Box");
    let val = m.names.intern("val");
    let ctor = m.method("demo/Box", weft::proc::CTOR_NAME, MethodSig::void());
    m.insert(
        ProcBuilder::new(ctor, ProcFlags { is_ctor: true, ..ProcFlags::default() })
            .locals(1)
            .ret(None)
            .build()
            .unwrap(),
    );
    let entry = m.method("demo/C", "mk", MethodSig::void());
    m.insert(
        ProcBuilder::new(entry, ProcFlags::statik())
            .new_obj(cls)
            .call(p.park, DispatchKind::Static)
            .dup()
            .call(ctor, DispatchKind::Special)
            .dup()
            .push_int(5)
            .op(Op::PutField {
                owner: cls,
                field: val,
                kind: ValueKind::Int,
            })
            .op(Op::GetField {
                owner: cls,
                field: val,
                kind: ValueKind::Int,
            })
            .call(io.print_int, DispatchKind::Static)
            .ret(None)
            .build()
            .unwrap(),
    );
    common::instrument_standard(&mut m).unwrap();

    let mut env = RtEnv::new(m);
    weft::sched::install_primitives(&mut env);
    let io2 = common::printers(&mut env.module);
    let trace = common::install_printers(&mut env, &io2);

    let mut cont = Continuation::new(entry, None);
    assert_eq!(common::drive(&env, &mut cont).unwrap(), 1);
    assert_eq!(common::snapshot(&trace), vec!["5"]);
}

#[test]
fn monitors_are_reacquired_on_resume() {
    let mut m = Module::new();
    let p = common::prims(&mut m);
    let io = common::printers(&mut m);
    let cls = m.names.intern("demo/Lock");
    let ctor = m.method("demo/Lock", weft::proc::CTOR_NAME, MethodSig::void());
    m.insert(
        ProcBuilder::new(ctor, ProcFlags { is_ctor: true, ..ProcFlags::default() })
            .locals(1)
            .ret(None)
            .build()
            .unwrap(),
    );
    let entry = m.method("demo/C", "locked", MethodSig::void());
    m.insert(
        ProcBuilder::new(entry, ProcFlags::statik())
            .new_obj(cls)
            .dup()
            .call(ctor, DispatchKind::Special)
            .store(ValueKind::Ref, 0)
            .load(ValueKind::Ref, 0)
            .monitor_enter()
            .call(p.park, DispatchKind::Static)
            .load(ValueKind::Ref, 0)
            .monitor_exit()
            .push(Const::Str("clean".into()))
            .call(io.print, DispatchKind::Static)
            .ret(None)
            .build()
            .unwrap(),
    );
    common::instrument_standard(&mut m).unwrap();

    let mut env = RtEnv::new(m);
    weft::sched::install_primitives(&mut env);
    let io2 = common::printers(&mut env.module);
    let trace = common::install_printers(&mut env, &io2);

    let mut cont = Continuation::new(entry, None);
    assert_eq!(common::drive(&env, &mut cont).unwrap(), 1);
    assert_eq!(common::snapshot(&trace), vec!["clean"]);
}

#[test]
fn failure_after_resume_is_rethrown_once() {
    let mut m = Module::new();
    let p = common::prims(&mut m);
    let entry = m.method("demo/C", "die", MethodSig::void());
    m.insert(
        ProcBuilder::new(entry, ProcFlags::statik())
            .call(p.park, DispatchKind::Static)
            .push(Const::Str("late failure".into()))
            .op(Op::Throw)
            .build()
            .unwrap(),
    );
    common::instrument_standard(&mut m).unwrap();

    let mut env = RtEnv::new(m);
    weft::sched::install_primitives(&mut env);

    let mut cont = Continuation::new(entry, None);
    assert_eq!(cont.resume(&env, None).unwrap(), true);
    assert_eq!(
        cont.resume(&env, None),
        Err(WeftError::user_throw("late failure"))
    );
    assert!(cont.is_done());
    assert_eq!(cont.resume(&env, None), Err(WeftError::ResumeAfterDone));
}

#[test]
fn instance_entry_keeps_its_receiver() {
    let mut m = Module::new();
    let p = common::prims(&mut m);
    let io = common::printers(&mut m);
    let cls_owner = "demo/Holder";
    let tag = m.names.intern("tag");
    let entry = m.method(cls_owner, "run", MethodSig::void());
    let cls = entry.owner;
    m.insert(
        ProcBuilder::new(entry, ProcFlags::default())
            .locals(1)
            .load(ValueKind::Ref, 0)
            .op(Op::GetField {
                owner: cls,
                field: tag,
                kind: ValueKind::Int,
            })
            .call(io.print_int, DispatchKind::Static)
            .call(p.park, DispatchKind::Static)
            .load(ValueKind::Ref, 0)
            .op(Op::GetField {
                owner: cls,
                field: tag,
                kind: ValueKind::Int,
            })
            .call(io.print_int, DispatchKind::Static)
            .ret(None)
            .build()
            .unwrap(),
    );
    common::instrument_standard(&mut m).unwrap();

    let mut env = RtEnv::new(m);
    weft::sched::install_primitives(&mut env);
    let io2 = common::printers(&mut env.module);
    let trace = common::install_printers(&mut env, &io2);

    let receiver = weft::rt::Obj::new(cls);
    receiver.set_field(tag, weft::rt::Value::Int(11));
    let mut cont = Continuation::new(entry, Some(weft::rt::Value::obj(receiver)));
    assert_eq!(common::drive(&env, &mut cont).unwrap(), 1);
    assert_eq!(common::snapshot(&trace), vec!["11", "11"]);
}
