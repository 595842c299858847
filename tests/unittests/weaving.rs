// Structural checks on woven output.

use rustc_hash::FxHashSet;

use weft::analysis::{analyze, AllowList, NeverSuspends};
use weft::names::MethodSig;
use weft::proc::{
    compute_frames, Const, DispatchKind, Module, Op, ProcBuilder, ProcFlags, ValueKind,
};
use weft::weave::{WeaveConfig, Weaver};

use crate::common;

fn weave_with(
    m: &mut Module,
    config: WeaveConfig,
    proc: weft::Procedure,
) -> weft::Procedure {
    let weaver = Weaver::with_config(m, config);
    m.insert(proc.clone());
    let allow = AllowList::standard(m);
    let facts = analyze(m, &allow, &NeverSuspends).unwrap();
    let frames = compute_frames(m, &proc).unwrap();
    let sites = facts.suspending_sites(m, &allow, &NeverSuspends, &proc);
    weaver.weave(m, &proc, &frames, &sites).unwrap()
}

#[test]
fn unchanged_procedure_is_structurally_identical() {
    let mut m = Module::new();
    let id = m.method("demo/W", "calm", MethodSig::new(vec![ValueKind::Int], Some(ValueKind::Int)));
    let proc = ProcBuilder::new(id, ProcFlags::statik())
        .load(ValueKind::Int, 0)
        .push_int(2)
        .arith(ValueKind::Int, weft::proc::ArithOp::Mul)
        .ret(Some(ValueKind::Int))
        .build()
        .unwrap();
    let woven = weave_with(&mut m, WeaveConfig::default(), proc.clone());
    assert_eq!(woven.ops, proc.ops);
    assert_eq!(woven.max_locals, proc.max_locals);
    assert!(!woven.woven);
}

#[test]
fn monitor_guard_is_emitted_around_the_site() {
    let mut m = Module::new();
    let p = common::prims(&mut m);
    let id = m.method("demo/W", "locked", MethodSig::new(vec![ValueKind::Ref], None));
    let proc = ProcBuilder::new(id, ProcFlags::statik())
        .load(ValueKind::Ref, 0)
        .monitor_enter()
        .call(p.park, DispatchKind::Static)
        .load(ValueKind::Ref, 0)
        .monitor_exit()
        .ret(None)
        .build()
        .unwrap();
    let woven = weave_with(&mut m, WeaveConfig::default(), proc);

    // The original pair plus one release in the save block and one
    // re-acquire in the restore block.
    let enters = woven
        .ops
        .iter()
        .filter(|op| matches!(op, Op::MonitorEnter))
        .count();
    let exits = woven
        .ops
        .iter()
        .filter(|op| matches!(op, Op::MonitorExit))
        .count();
    assert_eq!(enters, 2);
    assert_eq!(exits, 2);
    assert!(compute_frames(&m, &woven).is_ok());
}

#[test]
fn uninit_allocation_is_rerun_in_the_restore_block() {
    let mut m = Module::new();
    let p = common::prims(&mut m);
    let cls = m.names.intern("demo/Box");
    let ctor = m.method("demo/Box", weft::proc::CTOR_NAME, MethodSig::void());
    m.insert(
        ProcBuilder::new(ctor, ProcFlags { is_ctor: true, ..ProcFlags::default() })
            .locals(1)
            .ret(None)
            .build()
            .unwrap(),
    );
    let id = m.method("demo/W", "mk", MethodSig::void());
    let proc = ProcBuilder::new(id, ProcFlags::statik())
        .new_obj(cls)
        .call(p.park, DispatchKind::Static)
        .dup()
        .call(ctor, DispatchKind::Special)
        .pop()
        .ret(None)
        .build()
        .unwrap();
    let woven = weave_with(&mut m, WeaveConfig::default(), proc);

    // Two allocations of the class: the body one and the restore rerun.
    let news = woven
        .ops
        .iter()
        .filter(|op| matches!(op, Op::New { class } if *class == cls))
        .count();
    assert_eq!(news, 2);
    assert!(compute_frames(&m, &woven).is_ok());
}

#[test]
fn reflective_sites_save_argument_values() {
    let mut m = Module::new();
    let invoke = m.method(
        "lib/Reflect",
        "invoke",
        MethodSig::new(vec![ValueKind::Int], None),
    );
    let mut config = WeaveConfig::default();
    config.reflective_targets = FxHashSet::from_iter([invoke]);

    let id = m.method("demo/W", "reflect", MethodSig::void());
    let proc = ProcBuilder::new(id, ProcFlags::statik())
        .push(Const::Int(5))
        .call(invoke, DispatchKind::Static)
        .ret(None)
        .build()
        .unwrap();
    let reflective = weave_with(&mut m, config, proc.clone());
    let plain = weave_with(&mut m, WeaveConfig::default(), proc);

    // The reflective weave stores the argument into a scratch slot and
    // pushes it onto a lane; the plain weave only dummies it.
    let count_pushes = |p: &weft::Procedure| {
        p.ops
            .iter()
            .filter(|op| match op {
                Op::Call { target, .. } => {
                    m.names.name(target.name) == Some("push_i")
                }
                _ => false,
            })
            .count()
    };
    assert_eq!(count_pushes(&plain), 0);
    assert_eq!(count_pushes(&reflective), 1);
    // The plain weave resumes with the default placeholder instead.
    let has_default_arg = plain
        .ops
        .iter()
        .any(|op| matches!(op, Op::Push(Const::Int(0))));
    assert!(has_default_arg);
}

#[test]
fn woven_entry_dispatch_targets_every_site() {
    let mut m = Module::new();
    let p = common::prims(&mut m);
    let id = m.method("demo/W", "three", MethodSig::void());
    let proc = ProcBuilder::new(id, ProcFlags::statik())
        .call(p.park, DispatchKind::Static)
        .call(p.yield_, DispatchKind::Static)
        .call(p.park, DispatchKind::Static)
        .ret(None)
        .build()
        .unwrap();
    let woven = weave_with(&mut m, WeaveConfig::default(), proc);

    let targets = woven
        .ops
        .iter()
        .find_map(|op| match op {
            Op::Switch { targets, .. } => Some(targets.len()),
            _ => None,
        })
        .unwrap();
    assert_eq!(targets, 3);
}
