//! Strands: green threads driving one continuation each.
//!
//! A strand is a cloneable handle onto shared state whose transitions are
//! all CAS-protected. The unpark protocol is permit-based: `unpark` leaves
//! its permit set and flips a waiting strand back to runnable; the next
//! park consumes any outstanding permit before committing to wait, and
//! re-checks after the state write, so a wakeup can never be lost. A park
//! may return spuriously; every waiting loop in the primitives re-checks
//! its condition.

use parking_lot::{Condvar, Mutex};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crate::error::{Result, WeftError};
use crate::rt::Continuation;
use crate::sched::scheduler::SchedCore;
use crate::sched::timer::TimerHandle;

/// Run state of a strand. `Terminated` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StrandState {
    New = 0,
    Runnable = 1,
    Waiting = 2,
    TimedWaiting = 3,
    Terminated = 4,
}

impl StrandState {
    fn from_u8(v: u8) -> StrandState {
        match v {
            0 => StrandState::New,
            1 => StrandState::Runnable,
            2 => StrandState::Waiting,
            3 => StrandState::TimedWaiting,
            _ => StrandState::Terminated,
        }
    }
}

/// Node of the lock-free join-waiter list.
struct WaiterNode {
    strand: Strand,
    next: *mut WaiterNode,
}

pub(crate) struct StrandInner {
    id: u64,
    state: AtomicU8,
    interrupted: AtomicBool,
    pending_unpark: AtomicBool,
    park_epoch: AtomicU64,
    waiters: AtomicPtr<WaiterNode>,
    pub(crate) continuation: Mutex<Option<Continuation>>,
    timer: Mutex<Option<TimerHandle>>,
    join_deadline: Mutex<Option<Instant>>,
    park_lock: Mutex<()>,
    park_cv: Condvar,
    term_lock: Mutex<bool>,
    term_cv: Condvar,
    sched: Weak<SchedCore>,
}

// The raw waiter pointer is only ever touched through CAS push and a
// single swap-drain; nodes are owned by whoever removes them.
unsafe impl Send for StrandInner {}
unsafe impl Sync for StrandInner {}

impl Drop for StrandInner {
    fn drop(&mut self) {
        // Free any nodes registered after the terminal drain.
        let mut head = self.waiters.swap(ptr::null_mut(), Ordering::AcqRel);
        while !head.is_null() {
            let node = unsafe { Box::from_raw(head) };
            head = node.next;
        }
    }
}

/// Handle to one green thread.
#[derive(Clone)]
pub struct Strand {
    inner: Arc<StrandInner>,
}

impl std::fmt::Debug for Strand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strand")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Strand {
    pub(crate) fn spawned(id: u64, cont: Continuation, sched: Weak<SchedCore>) -> Strand {
        Strand {
            inner: Arc::new(StrandInner {
                id,
                state: AtomicU8::new(StrandState::New as u8),
                interrupted: AtomicBool::new(false),
                pending_unpark: AtomicBool::new(false),
                park_epoch: AtomicU64::new(0),
                waiters: AtomicPtr::new(ptr::null_mut()),
                continuation: Mutex::new(Some(cont)),
                timer: Mutex::new(None),
                join_deadline: Mutex::new(None),
                park_lock: Mutex::new(()),
                park_cv: Condvar::new(),
                term_lock: Mutex::new(false),
                term_cv: Condvar::new(),
                sched,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn state(&self) -> StrandState {
        StrandState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == StrandState::Terminated
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::Acquire)
    }

    /// Move NEW → RUNNABLE and submit the first resume-step. Fails on any
    /// other starting state.
    pub fn start(&self) -> Result<()> {
        if !self.cas_state(StrandState::New, StrandState::Runnable) {
            return Err(WeftError::AlreadyStarted);
        }
        self.resubmit();
        Ok(())
    }

    /// Deliver a wakeup permit. Idempotent: permits do not accumulate.
    pub fn unpark(&self) {
        self.inner.pending_unpark.store(true, Ordering::Release);
        // A degraded blocking park waits on the condvar; pair the notify
        // with the lock so the flag write cannot slip between its check
        // and wait.
        drop(self.inner.park_lock.lock());
        self.inner.park_cv.notify_all();

        loop {
            let s = self.state();
            match s {
                StrandState::Waiting | StrandState::TimedWaiting => {
                    if self.cas_state(s, StrandState::Runnable) {
                        // The permit stays set; the next park consumes it
                        // and returns immediately instead of waiting.
                        self.cancel_timer();
                        self.resubmit();
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    /// Set the interrupted flag, then unpark. Never cancels work; the
    /// next wait observes the flag.
    pub fn interrupt(&self) {
        self.inner.interrupted.store(true, Ordering::Release);
        self.unpark();
    }

    /// Block the calling OS thread until this strand terminates.
    /// Returns false on timeout.
    pub fn wait_terminated(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|d| Instant::now() + d);
        let mut done = self.inner.term_lock.lock();
        while !*done {
            match deadline {
                None => self.inner.term_cv.wait(&mut done),
                Some(d) => {
                    if self.inner.term_cv.wait_until(&mut done, d).timed_out() {
                        return *done;
                    }
                }
            }
        }
        true
    }

    // ── Scheduler-side operations ───────────────────────────────────

    pub(crate) fn continuation(&self) -> &Mutex<Option<Continuation>> {
        &self.inner.continuation
    }

    pub(crate) fn cas_state(&self, from: StrandState, to: StrandState) -> bool {
        self.inner
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Consume an outstanding unpark permit.
    pub(crate) fn take_pending(&self) -> bool {
        self.inner.pending_unpark.swap(false, Ordering::AcqRel)
    }

    /// New park generation; stale timer callbacks compare against it.
    pub(crate) fn bump_epoch(&self) -> u64 {
        self.inner.park_epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn store_timer(&self, handle: TimerHandle) {
        *self.inner.timer.lock() = Some(handle);
    }

    pub(crate) fn cancel_timer(&self) {
        if let Some(h) = self.inner.timer.lock().take() {
            h.cancel();
        }
    }

    /// Timer-thread wakeup for a timed park of the given generation.
    /// A late fire after the strand moved on is a no-op.
    pub(crate) fn timed_wake(&self, epoch: u64) {
        if self.inner.park_epoch.load(Ordering::Acquire) != epoch {
            return;
        }
        if self.cas_state(StrandState::TimedWaiting, StrandState::Runnable) {
            *self.inner.timer.lock() = None;
            self.resubmit();
        }
    }

    pub(crate) fn resubmit(&self) {
        if let Some(core) = self.inner.sched.upgrade() {
            core.submit(self.clone());
        }
    }

    /// Mark terminated, wake OS-thread joiners, drain and unpark every
    /// green joiner. Runs exactly once, from the final resume-step.
    pub(crate) fn terminate(&self) {
        self.inner
            .state
            .store(StrandState::Terminated as u8, Ordering::Release);
        {
            let mut done = self.inner.term_lock.lock();
            *done = true;
        }
        self.inner.term_cv.notify_all();
        for waiter in self.drain_waiters() {
            waiter.unpark();
        }
    }

    /// Lock-free push onto the join-waiter list.
    pub(crate) fn push_waiter(&self, waiter: Strand) {
        let node = Box::into_raw(Box::new(WaiterNode {
            strand: waiter,
            next: ptr::null_mut(),
        }));
        loop {
            let head = self.inner.waiters.load(Ordering::Acquire);
            unsafe { (*node).next = head };
            if self
                .inner
                .waiters
                .compare_exchange(head, node, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
    }

    fn drain_waiters(&self) -> Vec<Strand> {
        let mut head = self.inner.waiters.swap(ptr::null_mut(), Ordering::AcqRel);
        let mut out = Vec::new();
        while !head.is_null() {
            let node = unsafe { Box::from_raw(head) };
            out.push(node.strand.clone());
            head = node.next;
        }
        out
    }

    // ── Degraded blocking park (lost-suspend fallback) ──────────────

    /// Park the carrier thread itself. Used when a suspension request
    /// reaches a chain with an unwoven frame: degraded but correct.
    /// Returns when a permit arrives, the strand is interrupted, or the
    /// timeout elapses.
    pub(crate) fn block_park(&self, timeout: Option<Duration>) {
        let deadline = timeout.map(|d| Instant::now() + d);
        let mut guard = self.inner.park_lock.lock();
        loop {
            if self.take_pending() || self.is_interrupted() {
                return;
            }
            match deadline {
                None => self.inner.park_cv.wait(&mut guard),
                Some(d) => {
                    if self.inner.park_cv.wait_until(&mut guard, d).timed_out() {
                        self.take_pending();
                        return;
                    }
                }
            }
        }
    }

    // ── Join-deadline scratch (one timed wait active per strand) ────

    pub(crate) fn set_join_deadline(&self, deadline: Instant) {
        *self.inner.join_deadline.lock() = Some(deadline);
    }

    pub(crate) fn join_deadline(&self) -> Option<Instant> {
        *self.inner.join_deadline.lock()
    }

    pub(crate) fn clear_join_deadline(&self) {
        *self.inner.join_deadline.lock() = None;
    }
}
