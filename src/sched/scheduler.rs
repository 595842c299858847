//! The scheduler: a bounded carrier-thread pool plus the timer service.
//!
//! The scheduler never registers strands; it only (re)submits resume-steps
//! for them. At most pool-size strands progress concurrently; parked
//! strands cost no carrier.

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::WeftError;
use crate::names::Sym;
use crate::proc::STRAND_CLASS;
use crate::rt::{Continuation, Obj, RtEnv, SuspendReason, Value};
use crate::sched::prims;
use crate::sched::strand::{Strand, StrandState};
use crate::sched::timer::TimerService;

/// Handler for an uncaught failure inside a strand; invoked exactly once
/// per failing strand.
pub type ErrorHandler = Arc<dyn Fn(&Strand, &WeftError) + Send + Sync>;

/// Pool configuration.
#[derive(Clone)]
pub struct SchedulerConfig {
    pub workers: usize,
    pub error_handler: ErrorHandler,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get().min(4))
            .unwrap_or(2);
        SchedulerConfig {
            workers,
            error_handler: Arc::new(|strand, err| {
                eprintln!("weft: strand {} failed: {}", strand.id(), err);
            }),
        }
    }
}

impl SchedulerConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_error_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&Strand, &WeftError) + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(f);
        self
    }
}

enum Task {
    Step(Strand),
    Stop,
}

pub(crate) struct SchedCore {
    pub(crate) env: Arc<RtEnv>,
    tx: Sender<Task>,
    timer: TimerService,
    error_handler: ErrorHandler,
    next_id: AtomicU64,
    strand_class: Sym,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl SchedCore {
    pub(crate) fn submit(self: &Arc<Self>, strand: Strand) {
        let _ = self.tx.send(Task::Step(strand));
    }
}

/// Green-thread scheduler over a shared runtime environment.
pub struct Scheduler {
    core: Arc<SchedCore>,
}

impl Scheduler {
    /// Build a scheduler, registering the suspension primitives into the
    /// environment's host registry.
    pub fn new(mut env: RtEnv, config: SchedulerConfig) -> Scheduler {
        prims::register(&mut env);
        let strand_class = env.module.names.intern(STRAND_CLASS);
        let env = Arc::new(env);

        let (tx, rx) = unbounded::<Task>();
        let core = Arc::new(SchedCore {
            env,
            tx,
            timer: TimerService::start(),
            error_handler: config.error_handler,
            next_id: AtomicU64::new(1),
            strand_class,
            workers: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        });

        let mut workers = core.workers.lock();
        for n in 0..config.workers.max(1) {
            let core = core.clone();
            let rx: Receiver<Task> = rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("weft-carrier-{}", n))
                .spawn(move || {
                    while let Ok(task) = rx.recv() {
                        match task {
                            Task::Step(strand) => resume_step(&core, strand),
                            Task::Stop => break,
                        }
                    }
                })
                .ok();
            if let Some(h) = handle {
                workers.push(h);
            }
        }
        drop(workers);

        Scheduler { core }
    }

    pub fn env(&self) -> &Arc<RtEnv> {
        &self.core.env
    }

    /// Create a NEW strand owning `cont`. Not scheduled until `start()`.
    pub fn spawn(&self, cont: Continuation) -> Strand {
        let id = self.core.next_id.fetch_add(1, Ordering::Relaxed);
        Strand::spawned(id, cont, Arc::downgrade(&self.core))
    }

    /// Wrap a strand handle as a runtime value, so green code can join or
    /// interrupt it.
    pub fn strand_value(&self, strand: &Strand) -> Value {
        Value::obj(Obj::with_native(
            self.core.strand_class,
            Arc::new(strand.clone()),
        ))
    }

    /// Stop the carriers and the timer thread. Parked strands are left
    /// wherever they are.
    pub fn shutdown(&self) {
        if self.core.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let workers: Vec<_> = self.core.workers.lock().drain(..).collect();
        for _ in &workers {
            let _ = self.core.tx.send(Task::Stop);
        }
        for w in workers {
            let _ = w.join();
        }
        self.core.timer.shutdown();
    }

}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").finish()
    }
}

/// One resume-step: drive the strand's continuation to its next
/// suspension or completion, then act on the suspend reason.
fn resume_step(core: &Arc<SchedCore>, strand: Strand) {
    if strand.is_terminated() {
        return;
    }
    let mut cont = match strand.continuation().lock().take() {
        Some(c) => c,
        None => return,
    };

    let result = cont.resume(&core.env, Some(&strand));
    let reason = cont.take_reason();
    *strand.continuation().lock() = Some(cont);

    match result {
        Ok(true) => match reason.unwrap_or(SuspendReason::Park) {
            SuspendReason::Yield => core.submit(strand),
            SuspendReason::Park => park_transition(core, strand, None),
            SuspendReason::TimedPark(d) => park_transition(core, strand, Some(d)),
        },
        Ok(false) => strand.terminate(),
        Err(e) => {
            (core.error_handler)(&strand, &e);
            strand.terminate();
        }
    }
}

/// Move a RUNNABLE strand into (timed) waiting, honoring any unpark that
/// raced in. The pending-permit recheck after the state write closes the
/// lost-wakeup window.
fn park_transition(core: &Arc<SchedCore>, strand: Strand, timed: Option<Duration>) {
    // A permit arrived before we parked: stay runnable.
    if strand.take_pending() {
        core.submit(strand);
        return;
    }

    let target = match timed {
        None => StrandState::Waiting,
        Some(_) => StrandState::TimedWaiting,
    };
    let epoch = strand.bump_epoch();
    if !strand.cas_state(StrandState::Runnable, target) {
        core.submit(strand);
        return;
    }

    if let Some(d) = timed {
        let handle = core.timer.schedule(Instant::now() + d, strand.clone(), epoch);
        strand.store_timer(handle);
    }

    // Post-write recheck: an unpark that landed between the permit check
    // and the state write would otherwise be lost.
    if strand.take_pending() && strand.cas_state(target, StrandState::Runnable) {
        strand.cancel_timer();
        core.submit(strand);
    }
}
