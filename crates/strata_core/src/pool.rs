//! Background worker pool.
//!
//! A bounded set of OS threads pulling jobs from a shared FIFO queue.
//! Submission never blocks the caller; jobs run to completion without
//! preemption, so a job stuck in a blocking engine call stalls only the
//! worker that picked it up.
//!
//! The pool is an owned object with a controlled lifetime: create it at
//! process start (or let a database handle create its own), call
//! [`shutdown`](WorkerPool::shutdown) at the end. There is no ambient
//! global pool.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

/// Default number of worker threads.
///
/// Matches the default size of the I/O pool in the host runtime the
/// original binding targeted.
pub const DEFAULT_WORKERS: usize = 4;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolShared {
    queue: Mutex<VecDeque<Job>>,
    available: Condvar,
    shutdown: AtomicBool,
}

/// A fixed-size pool of worker threads over a shared FIFO queue.
///
/// Jobs submitted before [`shutdown`](Self::shutdown) are always executed;
/// shutdown drains the queue before joining the workers. Jobs submitted
/// after shutdown are dropped and `submit` reports the rejection.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Creates a pool with [`DEFAULT_WORKERS`] threads.
    #[must_use]
    pub fn new() -> Self {
        Self::with_workers(DEFAULT_WORKERS)
    }

    /// Creates a pool with `workers` threads (at least one).
    #[must_use]
    pub fn with_workers(workers: usize) -> Self {
        let workers = workers.max(1);
        let shared = Arc::new(PoolShared {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let handles = (0..workers)
            .map(|id| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("strata-worker-{id}"))
                    .spawn(move || run_worker(id, &shared))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            shared,
            handles: Mutex::new(handles),
        }
    }

    /// Enqueues a job for execution on a worker thread.
    ///
    /// Returns immediately; the job runs strictly off the submitting
    /// thread. Returns false (dropping the job) if the pool has been shut
    /// down.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> bool {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return false;
        }
        self.shared.queue.lock().push_back(Box::new(job));
        self.shared.available.notify_one();
        true
    }

    /// Drains the queue and joins all worker threads.
    ///
    /// Jobs already enqueued run to completion before the workers exit.
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.available.notify_all();

        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            handle.join().expect("worker thread panicked");
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Signal only; joining here could deadlock when the last handle to
        // the pool is dropped from one of its own workers. Workers exit on
        // their own once the queue drains.
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.available.notify_all();
    }
}

fn run_worker(id: usize, shared: &PoolShared) {
    debug!(worker_id = id, "worker started");
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(job) = queue.pop_front() {
                    break Some(job);
                }
                if shared.shutdown.load(Ordering::Acquire) {
                    break None;
                }
                shared.available.wait(&mut queue);
            }
        };

        match job {
            Some(job) => {
                trace!(worker_id = id, "executing job");
                job();
            }
            None => break,
        }
    }
    debug!(worker_id = id, "worker stopped");
}
