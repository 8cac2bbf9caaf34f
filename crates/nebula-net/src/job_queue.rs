//! Serialized execution queue.
//!
//! Any number of threads may [`push`](JobQueue::push) jobs. The first pusher
//! that finds the queue idle becomes its drainer and runs jobs, one at a
//! time and in push order, until the queue is empty. Everyone else only
//! enqueues and returns. State owned by a queue's jobs therefore never sees
//! two jobs at once and needs no lock of its own.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// A unit of deferred work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Inner {
    jobs: VecDeque<Job>,
    draining: bool,
}

/// FIFO job queue with at most one concurrent drainer.
#[derive(Default)]
pub struct JobQueue {
    inner: Mutex<Inner>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `job`, draining the queue on this thread if nobody else is.
    ///
    /// A job may push onto its own queue; the new job runs after the
    /// current one, on the same drain.
    pub fn push(&self, job: impl FnOnce() + Send + 'static) {
        {
            let mut inner = self.inner.lock();
            inner.jobs.push_back(Box::new(job));
            if inner.draining {
                return;
            }
            inner.draining = true;
        }
        self.drain();
    }

    /// Jobs waiting to run.
    pub fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether some caller is currently draining.
    pub fn is_draining(&self) -> bool {
        self.inner.lock().draining
    }

    fn drain(&self) {
        // Clears the flag if a job panics so the next push can drain again.
        let mut guard = DrainGuard {
            queue: self,
            armed: true,
        };

        loop {
            let job = {
                let mut inner = self.inner.lock();
                match inner.jobs.pop_front() {
                    Some(job) => job,
                    None => {
                        inner.draining = false;
                        break;
                    }
                }
            };
            job();
        }

        guard.armed = false;
    }
}

struct DrainGuard<'a> {
    queue: &'a JobQueue,
    armed: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.queue.inner.lock().draining = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_single_thread_runs_in_push_order() {
        let queue = JobQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let log = Arc::clone(&log);
            queue.push(move || log.lock().push(i));
        }
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
        assert!(!queue.is_draining());
    }

    #[test]
    fn test_job_pushed_from_job_runs_after_it() {
        let queue = Arc::new(JobQueue::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner_queue = Arc::clone(&queue);
        let inner_log = Arc::clone(&log);
        queue.push(move || {
            inner_log.lock().push("outer start");
            let nested_log = Arc::clone(&inner_log);
            inner_queue.push(move || nested_log.lock().push("nested"));
            inner_log.lock().push("outer end");
        });

        assert_eq!(*log.lock(), vec!["outer start", "outer end", "nested"]);
    }

    #[test]
    fn test_concurrent_producers_fifo_and_exclusive() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 500;

        let queue = Arc::new(JobQueue::new());
        let running = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        let barrier = Arc::new(Barrier::new(PRODUCERS));

        let handles: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let queue = Arc::clone(&queue);
                let running = Arc::clone(&running);
                let overlaps = Arc::clone(&overlaps);
                let log = Arc::clone(&log);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    for seq in 0..PER_PRODUCER {
                        let running = Arc::clone(&running);
                        let overlaps = Arc::clone(&overlaps);
                        let log = Arc::clone(&log);
                        queue.push(move || {
                            if running.swap(true, Ordering::SeqCst) {
                                overlaps.fetch_add(1, Ordering::SeqCst);
                            }
                            log.lock().push((producer, seq));
                            running.store(false, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Every drainer was one of the joined producers.
        assert!(queue.is_empty());
        assert!(!queue.is_draining());
        assert_eq!(overlaps.load(Ordering::SeqCst), 0, "jobs ran concurrently");
        let log = log.lock();
        assert_eq!(log.len(), PRODUCERS * PER_PRODUCER);
        let mut next = [0usize; PRODUCERS];
        for &(producer, seq) in log.iter() {
            assert_eq!(seq, next[producer], "producer {producer} out of order");
            next[producer] += 1;
        }
    }

    #[test]
    fn test_panicking_job_does_not_wedge_queue() {
        let queue = JobQueue::new();
        let result = catch_unwind(AssertUnwindSafe(|| queue.push(|| panic!("job failed"))));
        assert!(result.is_err());
        assert!(!queue.is_draining());

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        queue.push(move || flag.store(true, Ordering::SeqCst));
        assert!(ran.load(Ordering::SeqCst));
    }
}
