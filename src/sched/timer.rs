//! Timer service for timed parks.
//!
//! One dedicated thread sleeps against a deadline heap. Entries carry the
//! park generation they were armed for; cancellation is best-effort; a
//! late fire is rejected by the strand's epoch/CAS check, so the worst a
//! stale entry can do is nothing.

use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crate::sched::strand::Strand;

/// Cancellation token for one scheduled entry.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

struct Entry {
    at: Instant,
    seq: u64,
    epoch: u64,
    strand: Strand,
    cancelled: Arc<AtomicBool>,
}

// Earliest deadline first out of the max-heap.
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct TimerShared {
    queue: Mutex<BinaryHeap<Entry>>,
    cv: Condvar,
    shutdown: AtomicBool,
    seq: AtomicU64,
}

/// The scheduler's timer thread.
pub(crate) struct TimerService {
    shared: Arc<TimerShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TimerService {
    pub(crate) fn start() -> TimerService {
        let shared = Arc::new(TimerShared {
            queue: Mutex::new(BinaryHeap::new()),
            cv: Condvar::new(),
            shutdown: AtomicBool::new(false),
            seq: AtomicU64::new(0),
        });
        let worker = shared.clone();
        let thread = std::thread::Builder::new()
            .name("weft-timer".to_string())
            .spawn(move || run(worker))
            .ok();
        TimerService {
            shared,
            thread: Mutex::new(thread),
        }
    }

    /// Arm a wakeup for `strand` at `at`, tagged with its park epoch.
    pub(crate) fn schedule(&self, at: Instant, strand: Strand, epoch: u64) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let entry = Entry {
            at,
            seq: self.shared.seq.fetch_add(1, Ordering::Relaxed),
            epoch,
            strand,
            cancelled: cancelled.clone(),
        };
        self.shared.queue.lock().push(entry);
        self.shared.cv.notify_all();
        TimerHandle { cancelled }
    }

    pub(crate) fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.cv.notify_all();
        if let Some(t) = self.thread.lock().take() {
            let _ = t.join();
        }
    }
}

impl std::fmt::Debug for TimerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerService").finish()
    }
}

fn run(shared: Arc<TimerShared>) {
    let mut queue = shared.queue.lock();
    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            return;
        }
        let now = Instant::now();
        match queue.peek() {
            None => {
                shared.cv.wait(&mut queue);
            }
            Some(head) if head.at <= now => {
                let entry = match queue.pop() {
                    Some(e) => e,
                    None => continue,
                };
                // Fire outside the lock; schedule() must not block on us.
                drop(queue);
                if !entry.cancelled.load(Ordering::Acquire) {
                    entry.strand.timed_wake(entry.epoch);
                }
                queue = shared.queue.lock();
            }
            Some(head) => {
                let at = head.at;
                shared.cv.wait_until(&mut queue, at);
            }
        }
    }
}
