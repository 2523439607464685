//! Error types for replica convergence

use kbench_deploy::DeployError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutoscaleError {
    /// Orchestrator call failed
    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] DeployError),

    /// Replicas did not converge before the deadline
    #[error("{name} did not reach {target} ready replicas after {polls} polls")]
    Timeout { name: String, target: u32, polls: u32 },

    /// A deleted pod was still listed when its grace ran out
    #[error("Pod {pod} still present {waited_ms}ms after deletion")]
    PodNotGone { pod: String, waited_ms: u64 },
}

/// Result type for autoscale operations
pub type AutoscaleResult<T> = Result<T, AutoscaleError>;
