// src/batch/unit.rs
use std::time::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};

/// The computation a [`WorkUnit`] carries. Runs once, on whichever worker
/// consumes the unit; may sleep, but is expected to terminate.
pub type ComputeFn<T> = Box<dyn FnOnce() -> anyhow::Result<T> + Send + 'static>;

/// One independent computation: an identity plus an injected compute
/// function. Immutable once created and owned by exactly one worker, so
/// units never need locking.
pub struct WorkUnit<T> {
    id: String,
    compute: ComputeFn<T>,
}

impl<T: Send + 'static> WorkUnit<T> {
    /// Creates a unit with a generated id.
    pub fn new<F>(compute: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        Self::labeled(Uuid::new_v4().to_string(), compute)
    }

    /// Creates a unit with a caller-chosen id, so results can be correlated
    /// back to their inputs after unordered fan-in.
    pub fn labeled<F>(id: impl Into<String>, compute: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        Self {
            id: id.into(),
            compute: Box::new(compute),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn into_parts(self) -> (String, ComputeFn<T>) {
        (self.id, self.compute)
    }
}

impl<T> std::fmt::Debug for WorkUnit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkUnit").field("id", &self.id).finish()
    }
}

/// Status of one completed unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum UnitStatus {
    Completed,
    Failed,
}

/// The outcome of one [`WorkUnit`], tagged with the unit's id. Produced
/// exactly once per dispatched unit, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitResult<T> {
    pub unit_id: String,
    pub status: UnitStatus,
    pub value: Option<T>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl<T> UnitResult<T> {
    pub(crate) fn success(unit_id: String, value: T, elapsed: Duration) -> Self {
        Self {
            unit_id,
            status: UnitStatus::Completed,
            value: Some(value),
            error: None,
            elapsed,
        }
    }

    pub(crate) fn failure(unit_id: String, message: String, elapsed: Duration) -> Self {
        Self {
            unit_id,
            status: UnitStatus::Failed,
            value: None,
            error: Some(message),
            elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == UnitStatus::Completed
    }

    /// Unwraps into the computed value, or the captured compute fault.
    pub fn into_value(self) -> PipelineResult<T> {
        match self.value {
            Some(value) => Ok(value),
            None => Err(PipelineError::ComputeFailed {
                unit_id: self.unit_id,
                message: self
                    .error
                    .unwrap_or_else(|| "no value produced".to_string()),
            }),
        }
    }
}

/// Overall status of one batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum BatchStatus {
    Success,
    Partial,
    Failed,
}

/// Aggregate view of a finished (or abandoned) batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub dispatched: usize,
    pub completed: usize,
    pub failed: usize,
    pub duration: Duration,
    pub status: BatchStatus,
}

impl BatchSummary {
    pub fn new<T>(dispatched: usize, results: &[UnitResult<T>], duration: Duration) -> Self {
        let completed = results.iter().filter(|r| r.is_success()).count();
        let failed = results.len() - completed;
        let status = if failed == 0 && completed == dispatched {
            BatchStatus::Success
        } else if completed > 0 {
            BatchStatus::Partial
        } else {
            BatchStatus::Failed
        };
        Self {
            dispatched,
            completed,
            failed,
            duration,
            status,
        }
    }
}
