// src/batch/tracker.rs
use std::time::Duration;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

use crate::error::{PipelineError, PipelineResult};

/// Completion barrier for one batch of workers.
///
/// The dispatcher calls [`add`](Self::add) with the batch size before any
/// worker starts, each worker calls [`done`](Self::done) exactly once, and
/// the caller blocks in [`wait`](Self::wait) until the count reaches zero.
/// Everything a worker did before `done()` is visible to the task that sees
/// `wait()` return; the internal lock provides that ordering.
pub struct CompletionTracker {
    outstanding: Mutex<usize>,
    zero: Notify,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self {
            outstanding: Mutex::new(0),
            zero: Notify::new(),
        }
    }

    /// Registers `n` pending completions. Must run before the corresponding
    /// `done()` calls can possibly execute, so the counter never transiently
    /// reads zero while workers are still being started.
    pub fn add(&self, n: usize) {
        let mut count = self.outstanding.lock();
        *count += n;
    }

    /// Signals one completion.
    ///
    /// # Panics
    ///
    /// Panics if called more times than [`add`](Self::add) registered. That
    /// is a contract violation by the caller and is surfaced immediately
    /// rather than leaving the counter in an undefined state.
    pub fn done(&self) {
        let mut count = self.outstanding.lock();
        *count = count
            .checked_sub(1)
            .expect("CompletionTracker::done() called more times than add()");
        if *count == 0 {
            trace!("completion tracker reached zero");
            self.zero.notify_waiters();
        }
    }

    /// Number of registered completions not yet signaled.
    pub fn outstanding(&self) -> usize {
        *self.outstanding.lock()
    }

    /// Waits until every registered completion has been signaled. Returns
    /// immediately if nothing is outstanding.
    pub async fn wait(&self) {
        loop {
            // Register with the notifier before checking the count,
            // otherwise a done() landing between the check and the await
            // would be missed.
            let notified = self.zero.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if *self.outstanding.lock() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Bounded wait: gives up after `timeout` with a `Timeout` error while
    /// leaving outstanding workers running. Their eventual results land in
    /// the batch channel and can still be drained or safely discarded.
    pub async fn wait_timeout(&self, timeout: Duration) -> PipelineResult<()> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| PipelineError::Timeout {
                operation: "batch wait".to_string(),
                waited: timeout,
            })
    }
}

impl Default for CompletionTracker {
    fn default() -> Self {
        Self::new()
    }
}
