//! Reentrant-write, shared-read spin lock.
//!
//! The whole lock state lives in one `u64`:
//!
//! ```text
//! +--------------------------+--------------------------+
//! | writer owner (32 bits)   | reader count (32 bits)   |
//! +--------------------------+--------------------------+
//! ```
//!
//! An owner value of 0 means no writer. The owner is the calling OS thread,
//! identified by a small id assigned on first use. The write recursion count
//! is kept next to the state and only ever touched by the current writer.
//!
//! Rules:
//! - a writer may re-acquire the write lock without blocking (counted);
//! - a writer may take read locks without blocking (write implies read);
//! - readers share the lock only while no writer is recorded;
//! - a new writer needs the state to be completely empty.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

const READ_MASK: u64 = 0x0000_0000_FFFF_FFFF;
const WRITE_SHIFT: u32 = 32;
const EMPTY: u64 = 0;

static NEXT_OWNER_ID: AtomicU32 = AtomicU32::new(1);

thread_local! {
    static OWNER_ID: Cell<u32> = const { Cell::new(0) };
}

/// Return the lock-owner id of the calling thread, assigning one on first use.
fn current_owner() -> u32 {
    OWNER_ID.with(|id| {
        if id.get() == 0 {
            id.set(NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed));
        }
        id.get()
    })
}

fn writer_of(state: u64) -> u32 {
    (state >> WRITE_SHIFT) as u32
}

/// Backoff policy for contended acquisition: spin `max_spins` times, then
/// yield the thread and start over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpinPolicy {
    /// Compare-and-swap attempts before yielding. Default: 5000.
    pub max_spins: u32,
}

impl Default for SpinPolicy {
    fn default() -> Self {
        Self { max_spins: 5000 }
    }
}

impl SpinPolicy {
    fn acquire(&self, mut attempt: impl FnMut() -> bool) {
        loop {
            for _ in 0..self.max_spins {
                if attempt() {
                    return;
                }
                std::hint::spin_loop();
            }
            std::thread::yield_now();
        }
    }
}

/// A reader-writer spin lock with reentrant writes.
///
/// The lock protects no data of its own; callers pair it with the state it
/// guards. Prefer [`Lock::write`] and [`Lock::read`], which release on drop.
#[derive(Debug, Default)]
pub struct Lock {
    state: AtomicU64,
    write_count: AtomicU32,
    policy: SpinPolicy,
}

impl Lock {
    /// Create an unlocked lock with the default spin policy.
    pub fn new() -> Self {
        Self::with_policy(SpinPolicy::default())
    }

    /// Create an unlocked lock with a custom spin policy.
    pub fn with_policy(policy: SpinPolicy) -> Self {
        Self {
            state: AtomicU64::new(EMPTY),
            write_count: AtomicU32::new(0),
            policy,
        }
    }

    /// Acquire the write lock, spinning until the lock is empty.
    ///
    /// Re-entering from the thread that already holds the write lock only
    /// bumps the recursion count.
    pub fn write_lock(&self) {
        let me = current_owner();
        if writer_of(self.state.load(Ordering::Acquire)) == me {
            self.write_count.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let desired = u64::from(me) << WRITE_SHIFT;
        self.policy.acquire(|| {
            self.state
                .compare_exchange_weak(EMPTY, desired, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
        });
        self.write_count.store(1, Ordering::Relaxed);
    }

    /// Release one level of the write lock.
    ///
    /// When the last level is released the writer bits are cleared; read
    /// locks taken while writing stay held until their own `read_unlock`.
    ///
    /// A call from a thread that does not hold the write lock is logged and
    /// ignored.
    pub fn write_unlock(&self) {
        if writer_of(self.state.load(Ordering::Acquire)) != current_owner() {
            tracing::error!("write_unlock called by a thread that does not hold the write lock");
            return;
        }
        let remaining = self.write_count.fetch_sub(1, Ordering::Relaxed) - 1;
        if remaining == 0 {
            self.state.fetch_and(READ_MASK, Ordering::Release);
        }
    }

    /// Acquire a shared read lock.
    ///
    /// The current writer may always read; anyone else waits until no writer
    /// is recorded.
    pub fn read_lock(&self) {
        if writer_of(self.state.load(Ordering::Acquire)) == current_owner() {
            self.state.fetch_add(1, Ordering::Acquire);
            return;
        }

        self.policy.acquire(|| {
            let expected = self.state.load(Ordering::Relaxed) & READ_MASK;
            self.state
                .compare_exchange_weak(expected, expected + 1, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
        });
    }

    /// Release a shared read lock.
    pub fn read_unlock(&self) {
        let prev = self.state.fetch_sub(1, Ordering::Release);
        debug_assert!(prev & READ_MASK > 0, "read_unlock without a matching read_lock");
    }

    /// Acquire the write lock and return a guard that releases it on drop.
    pub fn write(&self) -> WriteGuard<'_> {
        self.write_lock();
        WriteGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Acquire a read lock and return a guard that releases it on drop.
    pub fn read(&self) -> ReadGuard<'_> {
        self.read_lock();
        ReadGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Whether any thread currently holds the write lock.
    pub fn is_write_locked(&self) -> bool {
        writer_of(self.state.load(Ordering::Acquire)) != 0
    }

    /// Number of read locks currently held.
    pub fn reader_count(&self) -> u32 {
        (self.state.load(Ordering::Acquire) & READ_MASK) as u32
    }
}

/// Write access to a [`Lock`]; released on drop.
///
/// Not `Send`: ownership is tied to the acquiring thread.
#[must_use = "the write lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'a> {
    lock: &'a Lock,
    _not_send: PhantomData<*const ()>,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.write_unlock();
    }
}

/// Read access to a [`Lock`]; released on drop.
#[must_use = "the read lock is released as soon as the guard is dropped"]
pub struct ReadGuard<'a> {
    lock: &'a Lock,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.read_unlock();
    }
}
