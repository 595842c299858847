// Lost-suspend fallback: a suspension that reaches a chain with an
// unwoven frame must block the carrier instead of corrupting state.

use std::time::{Duration, Instant};

use weft::analysis::{AllowList, NeverSuspends};
use weft::names::MethodSig;
use weft::pipeline::instrument;
use weft::proc::{Const, DispatchKind, Module, ProcBuilder, ProcFlags, STRAND_OWNER};
use weft::rt::{Continuation, RtEnv};
use weft::sched::{Scheduler, SchedulerConfig, StrandState};
use weft::weave::WeaveConfig;

use crate::common;

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn fully_unwoven_chain_blocks_the_carrier() {
    let mut m = Module::new();
    let p = common::prims(&mut m);
    let io = common::printers(&mut m);
    let entry = m.method("demo/D", "run", MethodSig::void());
    m.insert(
        ProcBuilder::new(entry, ProcFlags::statik())
            .call(p.park, DispatchKind::Static)
            .push(Const::Str("done".into()))
            .call(io.print, DispatchKind::Static)
            .ret(None)
            .build()
            .unwrap(),
    );

    // Lie to the analyzer: the strand owner is declared safe, so nothing
    // is woven and the park lands on an unwoven frame.
    let mut allow = AllowList::standard(&m);
    allow.allow(m.names.get(STRAND_OWNER).unwrap());
    let out = instrument(&mut m, &allow, &NeverSuspends, WeaveConfig::default()).unwrap();
    assert!(out.woven.is_empty());

    let mut env = RtEnv::new(m);
    let io2 = common::printers(&mut env.module);
    let trace = common::install_printers(&mut env, &io2);
    let sched = Scheduler::new(env, SchedulerConfig::default().with_workers(2));

    let strand = sched.spawn(Continuation::new(entry, None));
    strand.start().unwrap();

    // The strand never reaches WAITING: its carrier is genuinely blocked
    // while the strand stays RUNNABLE.
    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(strand.state(), StrandState::Runnable);
    assert!(common::snapshot(&trace).is_empty());

    strand.unpark();
    assert!(strand.wait_terminated(Some(WAIT)));
    assert_eq!(common::snapshot(&trace), vec!["done"]);
}

#[test]
fn unwoven_middle_frame_degrades_but_stays_correct() {
    // entry (woven) -> middle (analyzer false-negative, unwoven) -> park.
    let mut m = Module::new();
    let p = common::prims(&mut m);
    let io = common::printers(&mut m);
    let middle = m.method("demo/D", "middle", MethodSig::void());
    let middle_proc = ProcBuilder::new(middle, ProcFlags::statik())
        .call(p.park, DispatchKind::Static)
        .push(Const::Str("middle after park".into()))
        .call(io.print, DispatchKind::Static)
        .ret(None)
        .build()
        .unwrap();
    m.insert(middle_proc.clone());
    let entry = m.method("demo/D", "run", MethodSig::void());
    m.insert(
        ProcBuilder::new(entry, ProcFlags::statik())
            .call(middle, DispatchKind::Static)
            .push(Const::Str("entry done".into()))
            .call(io.print, DispatchKind::Static)
            .ret(None)
            .build()
            .unwrap(),
    );
    common::instrument_standard(&mut m).unwrap();

    // Simulate the false negative by reinstating the unwoven middle.
    m.insert(middle_proc);
    assert!(!m.get(middle).unwrap().woven);
    assert!(m.get(entry).unwrap().woven);

    let mut env = RtEnv::new(m);
    let io2 = common::printers(&mut env.module);
    let trace = common::install_printers(&mut env, &io2);
    let sched = Scheduler::new(env, SchedulerConfig::default().with_workers(2));

    let strand = sched.spawn(Continuation::new(entry, None));
    let started = Instant::now();
    strand.start().unwrap();

    std::thread::sleep(Duration::from_millis(40));
    assert!(common::snapshot(&trace).is_empty());

    strand.unpark();
    assert!(strand.wait_terminated(Some(WAIT)));
    // Degraded, not broken: everything still happens exactly once, in
    // order.
    assert_eq!(
        common::snapshot(&trace),
        vec!["middle after park", "entry done"]
    );
    assert!(started.elapsed() >= Duration::from_millis(40));
}
