//! Deferred jobs ordered by due tick.
//!
//! [`JobTimer::push_after`] schedules a job `delay` ticks from now;
//! [`JobTimer::flush`] runs every job that is due, earliest first. A driver
//! calls `flush` continuously, usually through [`JobTimer::run`]. Jobs that
//! must repeat push themselves again from inside their own body.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicU64};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::job_queue::Job;

/// Source of the current tick.
pub trait TickSource: Send + Sync {
    fn now(&self) -> u64;
}

impl<T: TickSource + ?Sized> TickSource for Arc<T> {
    fn now(&self) -> u64 {
        (**self).now()
    }
}

/// Milliseconds elapsed since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for MonotonicClock {
    fn now(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, tick: u64) {
        self.now.store(tick, atomic::Ordering::SeqCst);
    }

    pub fn advance(&self, ticks: u64) {
        self.now.fetch_add(ticks, atomic::Ordering::SeqCst);
    }
}

impl TickSource for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(atomic::Ordering::SeqCst)
    }
}

struct Entry {
    execute_at: u64,
    seq: u64,
    job: Job,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.execute_at == other.execute_at && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl Ord for Entry {
    /// Reversed so the max-heap pops the earliest due entry first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .execute_at
            .cmp(&self.execute_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority queue of jobs keyed by the tick they become due.
pub struct JobTimer<C = MonotonicClock> {
    clock: C,
    entries: Mutex<BinaryHeap<Entry>>,
    next_seq: AtomicU64,
}

impl JobTimer<MonotonicClock> {
    /// Timer driven by a millisecond [`MonotonicClock`].
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock::new())
    }
}

impl Default for JobTimer<MonotonicClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: TickSource> JobTimer<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            entries: Mutex::new(BinaryHeap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Current tick of the underlying clock.
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Schedule `job` to run on the next flush.
    pub fn push(&self, job: impl FnOnce() + Send + 'static) {
        self.push_after(0, job);
    }

    /// Schedule `job` to run once `delay` ticks have passed.
    pub fn push_after(&self, delay: u64, job: impl FnOnce() + Send + 'static) {
        let entry = Entry {
            execute_at: self.clock.now().saturating_add(delay),
            seq: self.next_seq.fetch_add(1, atomic::Ordering::Relaxed),
            job: Box::new(job),
        };
        self.entries.lock().push(entry);
    }

    /// Run every job due at the current tick, earliest first.
    ///
    /// The tick is sampled once per flush; jobs are invoked outside the lock
    /// so they may schedule further jobs. Returns the number of jobs run.
    pub fn flush(&self) -> usize {
        let now = self.clock.now();
        let mut ran = 0;

        loop {
            let job = {
                let mut entries = self.entries.lock();
                match entries.peek() {
                    Some(entry) if entry.execute_at <= now => {}
                    _ => break,
                }
                match entries.pop() {
                    Some(entry) => entry.job,
                    None => break,
                }
            };
            job();
            ran += 1;
        }

        ran
    }

    /// Scheduled jobs not yet run.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Tick at which the earliest job becomes due.
    pub fn next_due(&self) -> Option<u64> {
        self.entries.lock().peek().map(|entry| entry.execute_at)
    }

    /// Flush every `tick` until `shutdown` turns `true` or its sender drops.
    pub async fn run(&self, tick: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let ran = self.flush();
                    if ran > 0 {
                        tracing::trace!(ran, "timer flushed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!(pending = self.len(), "job timer stopped");
    }
}
