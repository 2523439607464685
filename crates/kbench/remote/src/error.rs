//! Error types for command execution

use thiserror::Error;

/// Errors raised while starting or talking to a command.
///
/// A command that runs and exits non-zero is not one of these.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// No credentials are known for the host
    #[error("Unknown host: {0}")]
    UnknownHost(String),

    /// The process could not be started
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading from or writing to the process failed
    #[error("IO error talking to {target}: {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// Input was sent after the session's stdin was closed
    #[error("Input already closed for session on {0}")]
    InputClosed(String),

    /// The command did not finish in time
    #[error("Command on {target} timed out after {timeout_ms}ms")]
    Timeout { target: String, timeout_ms: u64 },

    /// An output reader task failed
    #[error("Output reader failed: {0}")]
    Reader(String),
}

/// Result type for command execution
pub type RemoteResult<T> = Result<T, RemoteError>;
