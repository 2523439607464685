//! Error types for load generator invocations

use kbench_remote::RemoteError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InvokerError {
    /// The report never said where latencies were written
    #[error("Invoker report has no latency file line")]
    MissingLatencyFile,

    /// A required report line was absent
    #[error("Invoker report has no {0} line")]
    MissingField(&'static str),

    /// The generator exited non-zero
    #[error("Invoker exited with {exit_code:?}: {stderr}")]
    ProcessFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// A latency file held something other than numbers
    #[error("Bad latency sample '{value}' at {path}:{line}")]
    InvalidSample {
        path: PathBuf,
        line: usize,
        value: String,
    },

    #[error("Command execution failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for invocations
pub type InvokerResult<T> = Result<T, InvokerError>;
