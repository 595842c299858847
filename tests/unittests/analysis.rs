// Suspendability analysis over multi-procedure graphs.

use weft::analysis::{analyze, AllowList, ForeignOracle, NeverSuspends};
use weft::names::{MethodId, MethodSig};
use weft::proc::{DispatchKind, Module, ProcBuilder, ProcFlags, ValueKind};

use crate::common;

fn void_leaf(m: &mut Module, owner: &str, name: &str, flags: ProcFlags) -> MethodId {
    let id = m.method(owner, name, MethodSig::void());
    let locals = if flags.is_static { 0 } else { 1 };
    m.insert(
        ProcBuilder::new(id, flags)
            .locals(locals)
            .ret(None)
            .build()
            .unwrap(),
    );
    id
}

fn static_caller(m: &mut Module, owner: &str, name: &str, targets: &[MethodId]) -> MethodId {
    let id = m.method(owner, name, MethodSig::void());
    let mut b = ProcBuilder::new(id, ProcFlags::statik());
    for t in targets {
        b = b.call(*t, DispatchKind::Static);
    }
    m.insert(b.ret(None).build().unwrap());
    id
}

#[test]
fn diamond_propagation_reaches_the_root() {
    // root -> {left, right} -> sink -> park
    let mut m = Module::new();
    let p = common::prims(&mut m);
    let sink = static_caller(&mut m, "demo/G", "sink", &[p.park]);
    let left = static_caller(&mut m, "demo/G", "left", &[sink]);
    let right = static_caller(&mut m, "demo/G", "right", &[sink]);
    let root = static_caller(&mut m, "demo/G", "root", &[left, right]);
    let calm = void_leaf(&mut m, "demo/G", "calm", ProcFlags::statik());

    let map = analyze(&m, &AllowList::standard(&m), &NeverSuspends).unwrap();
    for id in [sink, left, right, root] {
        assert!(map.get(&m, id).unwrap(), "expected suspendable");
    }
    assert!(!map.get(&m, calm).unwrap());
}

#[test]
fn recursive_cycle_without_suspension_stays_clean() {
    // a <-> b recursion, no suspending sites anywhere.
    let mut m = Module::new();
    let a_id = m.method("demo/R", "a", MethodSig::void());
    let b_id = m.method("demo/R", "b", MethodSig::void());
    m.insert(
        ProcBuilder::new(a_id, ProcFlags::statik())
            .call(b_id, DispatchKind::Static)
            .ret(None)
            .build()
            .unwrap(),
    );
    m.insert(
        ProcBuilder::new(b_id, ProcFlags::statik())
            .call(a_id, DispatchKind::Static)
            .ret(None)
            .build()
            .unwrap(),
    );

    let map = analyze(&m, &AllowList::standard(&m), &NeverSuspends).unwrap();
    assert!(!map.get(&m, a_id).unwrap());
    assert!(!map.get(&m, b_id).unwrap());
}

#[test]
fn oracle_verdict_wins_on_allow_listed_owners() {
    struct LibSuspends;
    impl ForeignOracle for LibSuspends {
        fn may_suspend(&self, target: MethodId, _dispatch: DispatchKind) -> bool {
            // Method name id is opaque here; suspend everything asked.
            let _ = target;
            true
        }
    }

    let mut m = Module::new();
    let lib = m.method("lib/Io", "read", MethodSig::new(vec![], Some(ValueKind::Int)));
    let id = m.method("demo/O", "f", MethodSig::void());
    m.insert(
        ProcBuilder::new(id, ProcFlags::statik())
            .call(lib, DispatchKind::Static)
            .pop()
            .ret(None)
            .build()
            .unwrap(),
    );

    let mut allow = AllowList::standard(&m);
    allow.allow(lib.owner);

    // Allow-listed, but the oracle has seen this owner suspend.
    let map = analyze(&m, &allow, &LibSuspends).unwrap();
    assert!(map.get(&m, id).unwrap());

    // Same list, oracle with no such knowledge: clean.
    let map = analyze(&m, &allow, &NeverSuspends).unwrap();
    assert!(!map.get(&m, id).unwrap());
}

#[test]
fn constructor_calls_on_safe_owner_do_not_infect() {
    let mut m = Module::new();
    let foreign_ctor = m.method("lib/Buf", weft::proc::CTOR_NAME, MethodSig::void());
    let cls = foreign_ctor.owner;
    let id = m.method("demo/O", "mk", MethodSig::void());
    m.insert(
        ProcBuilder::new(id, ProcFlags::statik())
            .new_obj(cls)
            .call(foreign_ctor, DispatchKind::Special)
            .ret(None)
            .build()
            .unwrap(),
    );

    let mut allow = AllowList::standard(&m);
    allow.allow(cls);
    let map = analyze(&m, &allow, &NeverSuspends).unwrap();
    assert!(!map.get(&m, id).unwrap());
}
