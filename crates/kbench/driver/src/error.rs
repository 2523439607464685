//! Error types for experiment driving

use kbench_autoscale::AutoscaleError;
use kbench_deploy::DeployError;
use kbench_invoker::InvokerError;
use kbench_metrics::MetricsError;
use kbench_types::{BenchmarkValidationError, CycleOutcome};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid benchmark: {0}")]
    Benchmark(#[from] BenchmarkValidationError),

    #[error("Unknown benchmark: {0}")]
    UnknownBenchmark(String),

    /// Cluster nodes that are not Ready
    #[error("Nodes not ready: {}", .0.join(", "))]
    NodesNotReady(Vec<String>),

    #[error("Expected {expected} cluster nodes, found {found}")]
    NodeCount { expected: usize, found: usize },

    /// Nodes whose Prometheus did not answer
    #[error("Prometheus unreachable on: {}", .0.join(", "))]
    MetricsUnavailable(Vec<String>),

    /// Replica convergence gave up
    #[error("{name} did not converge: {reason}")]
    Convergence { name: String, reason: String },

    /// An invocation produced no latency samples
    #[error("No latencies recorded for {0}")]
    NoLatencies(String),

    #[error("Deployment error: {0}")]
    Deploy(#[from] DeployError),

    #[error("Autoscale error: {0}")]
    Autoscale(#[from] AutoscaleError),

    #[error("Invoker error: {0}")]
    Invoker(#[from] InvokerError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DriverError {
    /// How an experiment cycle that failed with this error should continue.
    pub fn outcome(&self) -> CycleOutcome {
        match self {
            DriverError::Deploy(
                DeployError::Creation { .. }
                | DeployError::ReadinessTimeout { .. }
                | DeployError::Command { .. }
                | DeployError::Remote(_),
            )
            | DriverError::Autoscale(_)
            | DriverError::Invoker(_)
            | DriverError::Metrics(_)
            | DriverError::NoLatencies(_) => CycleOutcome::retry(self.to_string()),
            _ => CycleOutcome::abort(self.to_string()),
        }
    }
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_classification() {
        let creation = DriverError::Deploy(DeployError::Creation {
            name: "fib-aaaaaaaaaa".into(),
            stderr: "object is being deleted".into(),
        });
        assert!(matches!(creation.outcome(), CycleOutcome::Retry { .. }));

        let no_data = DriverError::Metrics(MetricsError::NoData {
            query: "up".into(),
            node: "node1".into(),
        });
        assert!(matches!(no_data.outcome(), CycleOutcome::Retry { .. }));
        assert!(matches!(
            DriverError::NoLatencies("fib".into()).outcome(),
            CycleOutcome::Retry { .. }
        ));

        let bad_template = DriverError::Deploy(DeployError::Invalid("no containers".into()));
        assert!(matches!(bad_template.outcome(), CycleOutcome::Abort { .. }));

        let gave_up = DriverError::Convergence {
            name: "fib".into(),
            reason: "timeout".into(),
        };
        assert!(matches!(gave_up.outcome(), CycleOutcome::Abort { .. }));
    }
}
