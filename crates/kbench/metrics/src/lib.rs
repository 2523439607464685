//! kbench metrics: per-node utilization over a trailing window
//!
//! Every node runs its own Prometheus with a node exporter scraping it.
//! [`MetricsSampler`] asks each one for CPU, network and memory figures and
//! assembles an [`EnvSample`](kbench_types::EnvSample).

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]

pub mod backend;
pub mod error;
pub mod prometheus;
pub mod sampler;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use backend::MetricsBackend;
pub use error::{MetricsError, MetricsResult};
pub use prometheus::{MetricsConfig, PrometheusBackend};
pub use sampler::MetricsSampler;
