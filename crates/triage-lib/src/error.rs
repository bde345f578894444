//! Error taxonomy
//!
//! [`TriageError`] covers the setup failures that abort a whole run.
//! [`CollectError`] is scoped to a single CLI invocation; bundles turn it
//! into a degraded sample unless it hit the base resource listing.

use std::time::Duration;

use thiserror::Error;

/// Failure of one vendor CLI invocation
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },

    #[error("`{command}` exited with status {code}: {stderr}")]
    NonZeroExit {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("could not parse output of `{command}`: {reason}")]
    Parse { command: String, reason: String },
}

impl CollectError {
    /// Text suitable for a degraded sample / "Cannot access" issue
    pub fn stderr(&self) -> String {
        match self {
            CollectError::NonZeroExit { stderr, .. } => stderr.trim().to_string(),
            other => other.to_string(),
        }
    }
}

/// Fatal errors that end a run with a non-zero exit code
#[derive(Debug, Error)]
pub enum TriageError {
    #[error("missing required configuration: {0}")]
    MissingConfig(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("missing prerequisite: {0}")]
    MissingPrerequisite(String),

    #[error("failed to list {what}: {source}")]
    ListFailed {
        what: String,
        #[source]
        source: CollectError,
    },

    #[error("timed out waiting for {what} after {attempts} attempts")]
    WaitTimedOut { what: String, attempts: u32 },

    #[error("failed to write report: {0}")]
    Report(#[from] std::io::Error),

    #[error("failed to serialize issues: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to record run metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

pub type Result<T, E = TriageError> = std::result::Result<T, E>;
