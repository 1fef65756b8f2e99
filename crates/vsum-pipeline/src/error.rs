//! Pipeline error types.

use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Acquisition failed: {0}")]
    Acquisition(String),

    #[error("Store failed: {0}")]
    Store(String),

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Status fetch failed (transient): {0}")]
    TransientFetch(String),

    #[error("Status fetch failed: {0}")]
    FatalFetch(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Remote job failed: {0}")]
    RemoteFailed(String),

    #[error("Remote job {job_id} did not finish within {}s", .waited.as_secs())]
    Timeout { job_id: String, waited: Duration },

    #[error("interrupted")]
    Interrupted,

    #[error("Result write failed: {0}")]
    ResultWrite(String),

    #[error("No remote job id recorded for task {0}")]
    MissingJobId(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("worker panicked: {0}")]
    Panicked(String),

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn acquisition(msg: impl Into<String>) -> Self {
        Self::Acquisition(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn submission(msg: impl Into<String>) -> Self {
        Self::Submission(msg.into())
    }

    pub fn transient_fetch(msg: impl Into<String>) -> Self {
        Self::TransientFetch(msg.into())
    }

    pub fn fatal_fetch(msg: impl Into<String>) -> Self {
        Self::FatalFetch(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn remote_failed(msg: impl Into<String>) -> Self {
        Self::RemoteFailed(msg.into())
    }

    pub fn result_write(msg: impl Into<String>) -> Self {
        Self::ResultWrite(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Check if error is a transient fault worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::TransientFetch(_) | PipelineError::Connection(_)
        )
    }

    /// Check if error comes from a batch-wide stop.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, PipelineError::Interrupted)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PipelineError::Timeout { .. })
    }

    /// The innermost error, looking through exhausted retries.
    pub fn root_cause(&self) -> &PipelineError {
        match self {
            PipelineError::RetriesExhausted { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<RetryError<PipelineError>> for PipelineError {
    fn from(err: RetryError<PipelineError>) -> Self {
        match err {
            RetryError::Rejected(e) => e,
            RetryError::Exhausted {
                operation,
                attempts,
                source,
            } => PipelineError::RetriesExhausted {
                operation,
                attempts,
                source: Box::new(source),
            },
        }
    }
}
