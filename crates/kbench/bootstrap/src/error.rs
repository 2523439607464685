//! Error types for cluster formation

use kbench_remote::RemoteError;
use thiserror::Error;

use crate::state::ClusterState;

/// Bootstrap errors. All of them are fatal: the bootstrap stops and a human
/// is expected to look at the log before re-running.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Testbed configuration is unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// A command could not be run at all
    #[error("Remote execution failed: {0}")]
    Remote(#[from] RemoteError),

    /// A node exited non-zero during a fatal phase
    #[error("{phase} failed on {host} (exit {exit_code:?}), check the bootstrap log")]
    CommandFailed {
        phase: String,
        host: String,
        exit_code: Option<i32>,
    },

    /// No join command showed up in the master log in time
    #[error("Timed out after {waited_secs}s waiting for the join command on {host}")]
    JoinTimeout { host: String, waited_secs: u64 },

    /// The state machine was asked to make an illegal move
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: ClusterState, to: ClusterState },

    /// Log sink failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for bootstrap operations
pub type BootstrapResult<T> = Result<T, BootstrapError>;
