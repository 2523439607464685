//! CLI error types

use kbench_bootstrap::BootstrapError;
use kbench_driver::DriverError;
use kbench_metrics::MetricsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error("Metrics backend: {0}")]
    Metrics(#[from] MetricsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No benchmarks configured; add a `benchmarks` list to the config file")]
    NoBenchmarks,

    #[error("No worker nodes to sample metrics from")]
    NoMetricsNodes,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type CliResult<T> = Result<T, CliError>;
