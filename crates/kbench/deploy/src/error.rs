//! Error types for manifest handling and orchestrator calls

use kbench_remote::RemoteError;
use std::path::PathBuf;
use thiserror::Error;

/// Deployment errors
#[derive(Debug, Error)]
pub enum DeployError {
    /// A manifest template could not be read or parsed
    #[error("Manifest error in {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    /// A manifest parsed but is missing required structure
    #[error("Invalid manifest: {0}")]
    Invalid(String),

    /// A rename was rejected; the manifests are unchanged
    #[error("Rename to '{name}' rejected: {reason}")]
    Rename { name: String, reason: String },

    /// The orchestrator refused to create a workload, often because an
    /// object from a previous run is still terminating
    #[error("Failed to create {name}: {stderr}")]
    Creation { name: String, stderr: String },

    /// An orchestrator command exited non-zero
    #[error("Orchestrator command `{command}` failed (exit {exit_code:?}): {stderr}")]
    Command {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// A workload did not become ready in time
    #[error("Timed out after {waited_secs}s waiting for {name} to become ready")]
    ReadinessTimeout { name: String, waited_secs: u64 },

    /// Orchestrator output did not have the expected shape
    #[error("Unexpected orchestrator output: {0}")]
    Parse(String),

    /// A benchmark named a function with no artifact
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Command execution failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for deployment operations
pub type DeployResult<T> = Result<T, DeployError>;
