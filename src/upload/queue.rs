//! Bounded-concurrency job queue.
//!
//! One [`JobQueue`] is shared by every upload in the process; it is the only
//! process-wide mutable resource of the engine. Jobs are opaque async thunks
//! with no return value; all error handling is the job's own responsibility.
//!
//! # Usage
//!
//! ```ignore
//! let queue = JobQueue::new(3);
//!
//! // Never blocks; the job starts as soon as a slot frees up.
//! queue.enqueue(async move { upload_one_part().await });
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

// ─────────────────────────────────────────────────────────────────────────────
// JobQueue
// ─────────────────────────────────────────────────────────────────────────────

/// Runs async jobs with a fixed concurrency bound and FIFO dispatch.
///
/// `enqueue` never blocks and never rejects; excess jobs wait in an unbounded
/// pending queue. Cancellation is not this layer's concern: a job that must
/// stop early carries its own cancellation token.
///
/// Cloning is cheap and every clone shares the same queue.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<Inner>,
}

struct Inner {
    concurrency: usize,
    state: Mutex<QueueState>,
}

struct QueueState {
    pending: VecDeque<Job>,
    running: usize,
}

impl JobQueue {
    /// Creates a queue that runs at most `concurrency` jobs at a time.
    ///
    /// # Panics
    ///
    /// Panics if `concurrency` is zero.
    pub fn new(concurrency: usize) -> Self {
        assert!(concurrency >= 1, "concurrency must be at least 1");

        Self {
            inner: Arc::new(Inner {
                concurrency,
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    running: 0,
                }),
            }),
        }
    }

    /// Records `job` and starts it immediately if a slot is free.
    ///
    /// Jobs begin in the order enqueued; completion order is unspecified.
    /// Must be called from within a tokio runtime.
    pub fn enqueue<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        {
            let mut state = self.inner.state.lock().expect("job queue lock poisoned");
            state.pending.push_back(Box::pin(job));
        }
        Self::drain(&self.inner);
    }

    /// Number of jobs currently running.
    pub fn running(&self) -> usize {
        self.inner.state.lock().expect("job queue lock poisoned").running
    }

    /// Number of jobs waiting for a slot.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().expect("job queue lock poisoned").pending.len()
    }

    /// Starts pending jobs until the queue is empty or every slot is taken.
    fn drain(inner: &Arc<Inner>) {
        loop {
            let job = {
                let mut state = inner.state.lock().expect("job queue lock poisoned");
                if state.running >= inner.concurrency {
                    return;
                }
                let Some(job) = state.pending.pop_front() else {
                    return;
                };
                state.running += 1;
                job
            };

            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                job.await;
                {
                    let mut state = inner.state.lock().expect("job queue lock poisoned");
                    state.running -= 1;
                }
                // Settlement and the next job's start must not interleave in
                // the same poll.
                tokio::task::yield_now().await;
                Self::drain(&inner);
            });
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
