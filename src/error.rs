use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Compute failed: {unit_id} - {message}")]
    ComputeFailed {
        unit_id: String,
        message: String,
    },

    #[error("Timeout: {operation} exceeded {waited:?}")]
    Timeout {
        operation: String,
        waited: Duration,
    },

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("Batch incomplete: {completed} of {dispatched} results produced")]
    Incomplete {
        dispatched: usize,
        completed: usize,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unexpected error: {0}")]
    UnexpectedError(String),
}

impl From<anyhow::Error> for PipelineError {
    fn from(error: anyhow::Error) -> Self {
        PipelineError::UnexpectedError(error.to_string())
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
