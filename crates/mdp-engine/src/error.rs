//! Engine error taxonomy
//!
//! Every failure mode of a pipeline run maps onto exactly one variant, and
//! each variant carries a fixed retry discipline:
//!
//! - `Configuration` and `Auth` are fatal for the run and never retried by
//!   the engine; only the next scheduled trigger may try again.
//! - `TransientNetwork` is produced by the retrying invoker after its bounded
//!   in-process retries are exhausted.
//! - `Http` is a terminal, non-retryable HTTP status (a plain 4xx).
//! - `RemoteJob` and `Timeout` end the run, are audited with a synthetic
//!   status code, and are retried only by the hosting scheduler.
//! - `Persistence` is always propagated; the audit trail is the only durable
//!   failure record, so a swallowed write error would be invisible.
//! - `Normalization` never aborts a batch; it exists for per-row logging.

use thiserror::Error;

/// Result type alias for engine operations
pub type EngineResult<T> = std::result::Result<T, PipelineError>;

/// Pipeline error types
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Transient network failure: status {status} after {attempts} attempts")]
    TransientNetwork { status: u16, attempts: u32 },

    #[error("Terminal HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Remote job error: {0}")]
    RemoteJob(String),

    #[error("Poll deadline exceeded after {elapsed_secs}s")]
    Timeout { elapsed_secs: u64 },

    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("Normalization error: {0}")]
    Normalization(String),
}

impl PipelineError {
    /// Whether this failure is fatal for the run (never retried by the
    /// hosting scheduler's bounded policy).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Configuration(_) | PipelineError::Auth(_)
        )
    }

    /// Status code recorded on the bronze audit row for this failure.
    ///
    /// Failures that carry a real HTTP status keep it; timeouts are tagged
    /// 504, remote job errors 502, everything else 500, so every run leaves
    /// an inspectable audit record.
    pub fn synthetic_code(&self) -> i32 {
        match self {
            PipelineError::TransientNetwork { status, .. } if *status > 0 => *status as i32,
            PipelineError::Http { status, .. } => *status as i32,
            PipelineError::Timeout { .. } => 504,
            PipelineError::RemoteJob(_) => 502,
            _ => 500,
        }
    }
}
