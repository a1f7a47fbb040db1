//! Work-pool admission interface and a bounded reference pool.
//!
//! The scheduler demands exactly one thing of a pool: a non-blocking
//! *try to enqueue* whose failure means the occurrence is dropped. That is
//! the whole of [`WorkPool`]. Anything with a bounded admission path can sit
//! behind it.
//!
//! [`FixedPool`] is the reference implementation: a fixed worker crew pulling
//! from a bounded channel. Admission fails when the channel is full, which is
//! precisely the backpressure signal the dispatcher turns into a drop.
//!
//! # Correctness Invariants
//!
//! - **Non-blocking admission**: `try_submit` never waits, on any pool state.
//! - **Accepted work runs**: once admitted, a job is executed unless the pool
//!   is dropped first; drop drains nothing silently — workers finish the
//!   queue before joining.
//! - **No submissions after teardown begins**: the channel closes when the
//!   pool is dropped, so late `try_submit` calls fail cleanly.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender};

/// A unit of work dispatched by the scheduler.
///
/// Shared (`Arc`) because a periodic schedule submits the same function many
/// times, possibly while earlier submissions are still running.
pub type Work = Arc<dyn Fn() + Send + Sync>;

/// Non-blocking admission to some execution resource.
pub trait WorkPool: Send + Sync {
    /// Tries to enqueue `work`. Returns `false` if the pool refuses — the
    /// caller treats refusal as a dropped occurrence and must not retry.
    ///
    /// `priority` is advisory; implementations that maintain priority queues
    /// may use it to order execution.
    fn try_submit(&self, work: Work, priority: Option<i32>) -> bool;
}

/// Fixed-size worker pool over a bounded queue.
///
/// `queue_capacity` bounds jobs *waiting* for a worker; a pool with one
/// worker and capacity one holds at most one running and one pending job.
pub struct FixedPool {
    tx: Option<Sender<Work>>,
    workers: Vec<JoinHandle<()>>,
}

impl FixedPool {
    /// Creates a pool with `workers` threads and room for `queue_capacity`
    /// pending jobs.
    ///
    /// # Panics
    ///
    /// Panics if `workers` or `queue_capacity` is 0, or if worker threads
    /// cannot be spawned.
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        assert!(workers > 0, "FixedPool requires at least one worker");
        assert!(queue_capacity > 0, "FixedPool queue capacity must be > 0");

        let (tx, rx) = bounded::<Work>(queue_capacity);
        let workers = (0..workers)
            .map(|i| {
                let rx = rx.clone();
                thread::Builder::new()
                    .name(format!("pool-worker-{i}"))
                    .spawn(move || {
                        // recv fails only when all senders are gone: shutdown.
                        while let Ok(work) = rx.recv() {
                            work();
                        }
                    })
                    .expect("spawn pool worker")
            })
            .collect();

        Self {
            tx: Some(tx),
            workers,
        }
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }
}

impl WorkPool for FixedPool {
    fn try_submit(&self, work: Work, _priority: Option<i32>) -> bool {
        match &self.tx {
            Some(tx) => tx.try_send(work).is_ok(),
            None => false,
        }
    }
}

impl Drop for FixedPool {
    fn drop(&mut self) {
        // Closing the channel lets workers drain the queue and exit.
        self.tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
