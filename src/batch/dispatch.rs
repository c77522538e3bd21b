// src/batch/dispatch.rs
use std::sync::Arc;
use std::time::{Duration, Instant};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, trace, warn};

use crate::channel::{result_channel, Capacity, ResultReceiver, ResultSender};
use crate::error::PipelineResult;
use super::tracker::CompletionTracker;
use super::unit::{BatchSummary, ComputeFn, UnitResult, WorkUnit};

/// Fan-out executor: starts one worker per unit and wires the batch's
/// result channel and completion tracker.
///
/// By default every unit gets its own concurrent worker, with no queuing or
/// throttling; [`with_max_concurrent`](Self::with_max_concurrent) bounds the
/// number of computations in flight when the caller wants a pool instead.
pub struct Dispatcher {
    capacity: Capacity,
    max_concurrent: Option<usize>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            capacity: Capacity::Unbounded,
            max_concurrent: None,
        }
    }

    /// Overrides the result channel's buffering policy. With a bounded or
    /// rendezvous channel the caller must drain results concurrently (for
    /// example via [`BatchHandle::collect`]), or workers block on publish.
    pub fn with_capacity(mut self, capacity: Capacity) -> Self {
        self.capacity = capacity;
        self
    }

    /// Caps how many computations run at once. `0` means the number of
    /// available CPUs.
    pub fn with_max_concurrent(mut self, limit: usize) -> Self {
        let limit = if limit == 0 { num_cpus::get() } else { limit };
        self.max_concurrent = Some(limit);
        self
    }

    /// Starts one worker per unit and returns a handle for waiting on and
    /// reading the batch. The completion tracker is incremented by the full
    /// batch size before any worker starts, so it can never transiently read
    /// complete while spawning is still in progress.
    pub fn dispatch<T: Send + 'static>(&self, units: Vec<WorkUnit<T>>) -> BatchHandle<T> {
        let dispatched = units.len();
        let tracker = Arc::new(CompletionTracker::new());
        let (tx, rx) = result_channel(self.capacity);

        if units.is_empty() {
            info!("No units to dispatch");
            drop(tx);
            return BatchHandle {
                dispatched,
                started: Instant::now(),
                tracker,
                rx,
            };
        }

        info!(
            "Dispatching {} units (max concurrency: {})",
            dispatched,
            self.max_concurrent
                .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
        );

        tracker.add(dispatched);
        let limiter = self.max_concurrent.map(|n| Arc::new(Semaphore::new(n)));
        let started = Instant::now();

        for unit in units {
            let (unit_id, compute) = unit.into_parts();
            let tx = tx.clone();
            let tracker = tracker.clone();
            let limiter = limiter.clone();

            tokio::spawn(async move {
                run_worker(unit_id, compute, tx, tracker, limiter).await;
            });
        }
        drop(tx);

        BatchHandle {
            dispatched,
            started,
            tracker,
            rx,
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// One worker: compute, publish the result, then signal completion, in
/// that order, so a returned `wait()` implies every result was published.
/// The completion signal runs on every path, including compute faults and
/// panics; a worker's failure never reaches its siblings or the caller.
async fn run_worker<T: Send + 'static>(
    unit_id: String,
    compute: ComputeFn<T>,
    tx: ResultSender<UnitResult<T>>,
    tracker: Arc<CompletionTracker>,
    limiter: Option<Arc<Semaphore>>,
) {
    // The limiter is never closed while workers exist, but a failed acquire
    // just means running unthrottled rather than crashing the worker.
    let _permit = match &limiter {
        Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
        None => None,
    };

    debug!("Worker started for unit {}", unit_id);
    let start = Instant::now();

    // Computations are synchronous and may sleep, so they run off the async
    // runtime's core threads. A panic inside surfaces as a JoinError here
    // instead of unwinding through the worker.
    let outcome = tokio::task::spawn_blocking(compute).await;
    let elapsed = start.elapsed();

    let result = match outcome {
        Ok(Ok(value)) => {
            debug!("Unit {} completed in {:?}", unit_id, elapsed);
            UnitResult::success(unit_id.clone(), value, elapsed)
        }
        Ok(Err(e)) => {
            warn!("Unit {} failed: {}", unit_id, e);
            UnitResult::failure(unit_id.clone(), e.to_string(), elapsed)
        }
        Err(join_err) => {
            let message = if join_err.is_panic() {
                let payload = join_err.into_panic();
                payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "computation panicked".to_string())
            } else {
                join_err.to_string()
            };
            warn!("Unit {} panicked: {}", unit_id, message);
            UnitResult::failure(unit_id.clone(), message, elapsed)
        }
    };

    if tx.send(result).await.is_err() {
        // Batch was abandoned; the result is discardable by design.
        trace!("Result for unit {} discarded, batch abandoned", unit_id);
    }
    tracker.done();
}

/// Handle to one in-flight batch: the explicit per-batch context holding
/// its completion tracker and the receiving half of its result channel.
pub struct BatchHandle<T> {
    dispatched: usize,
    started: Instant,
    tracker: Arc<CompletionTracker>,
    rx: ResultReceiver<UnitResult<T>>,
}

/// Everything a finished collection produced, plus the aggregate counts.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport<T> {
    pub results: Vec<UnitResult<T>>,
    pub summary: BatchSummary,
}

impl<T: Send + 'static> BatchHandle<T> {
    /// Number of units dispatched into this batch.
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    /// Blocks until every worker has signaled completion. Returns exactly
    /// once per batch, and only after all results were published.
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    /// Bounded wait; `Incomplete` reports how much of the batch had finished
    /// when the deadline passed. Stragglers are abandoned, not killed, and
    /// their late results are discardable.
    pub async fn wait_timeout(&self, timeout: Duration) -> PipelineResult<()> {
        self.tracker.wait_timeout(timeout).await.map_err(|_| {
            let outstanding = self.tracker.outstanding();
            crate::error::PipelineError::Incomplete {
                dispatched: self.dispatched,
                completed: self.dispatched - outstanding,
            }
        })
    }

    /// Direct access to the batch's result stream, for callers that drive
    /// their own consuming loop or feed a multiplexer.
    pub fn results(&mut self) -> &mut ResultReceiver<UnitResult<T>> {
        &mut self.rx
    }

    /// Receives the next available result, or `None` once the batch's
    /// channel is drained and closed.
    pub async fn recv(&mut self) -> Option<UnitResult<T>> {
        self.rx.recv().await
    }

    /// Gives up the handle in exchange for the bare result stream, so the
    /// batch can be registered as one source of a multiplexer.
    pub fn into_results(self) -> ResultReceiver<UnitResult<T>> {
        self.rx
    }

    /// Takes whatever results are already buffered, without waiting.
    pub fn drain_ready(&mut self) -> Vec<UnitResult<T>> {
        let mut results = Vec::new();
        while let Some(r) = self.rx.try_recv() {
            results.push(r);
        }
        results
    }

    /// Drains the batch to completion: one result per dispatched unit,
    /// success or fault-tagged, in arrival order.
    pub async fn collect(mut self) -> BatchReport<T> {
        let mut results = Vec::with_capacity(self.dispatched);
        while let Some(r) = self.rx.recv().await {
            results.push(r);
        }
        let summary = BatchSummary::new(self.dispatched, &results, self.started.elapsed());
        debug!(
            "Batch complete: {}/{} succeeded in {:?}",
            summary.completed, summary.dispatched, summary.duration
        );
        BatchReport { results, summary }
    }

    /// Drains until the batch completes or the deadline passes, whichever
    /// comes first. On timeout the report carries the partial results and a
    /// non-`Success` status; stragglers keep running but publish into a
    /// closed channel.
    pub async fn collect_within(mut self, timeout: Duration) -> BatchReport<T> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut results = Vec::with_capacity(self.dispatched);

        loop {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(r)) => results.push(r),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Batch timed out after {:?} with {}/{} results",
                        timeout,
                        results.len(),
                        self.dispatched
                    );
                    self.rx.close();
                    while let Some(r) = self.rx.try_recv() {
                        results.push(r);
                    }
                    break;
                }
            }
        }

        let summary = BatchSummary::new(self.dispatched, &results, self.started.elapsed());
        BatchReport { results, summary }
    }
}
