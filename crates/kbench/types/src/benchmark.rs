//! Benchmark definitions
//!
//! A benchmark is an ordered list of functions, one of which is the entry
//! point that receives load. Definitions are parsed from the experiment
//! configuration and validated before the driver schedules anything.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::invocation::LatencyPercentiles;

/// Latency targets (microseconds) a benchmark is expected to meet
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sla {
    /// p50 target
    pub p50_us: f64,
    /// p90 target; the SLA is judged against this percentile
    pub p90_us: f64,
}

impl Sla {
    /// Whether observed latencies break the SLA.
    pub fn violated_by(&self, observed: &LatencyPercentiles) -> bool {
        observed.p90 > self.p90_us
    }
}

/// Inclusive range of requests-per-second values to draw from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpsRange {
    pub min: u32,
    pub max: u32,
}

impl RpsRange {
    pub fn fixed(rps: u32) -> Self {
        Self { min: rps, max: rps }
    }
}

/// Inclusive range of replica counts the driver may scale a benchmark to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaRange {
    pub min: u32,
    pub max: u32,
}

impl Default for ReplicaRange {
    fn default() -> Self {
        Self { min: 1, max: 1 }
    }
}

/// A benchmark as described in the experiment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    /// Logical benchmark name
    pub name: String,

    /// Function names, in deployment order
    pub functions: Vec<String>,

    /// Function that receives load
    #[serde(rename = "entry-point")]
    pub entry_point: String,

    /// Latency targets
    pub sla: Sla,

    /// Requests-per-second range
    #[serde(rename = "rps-range", alias = "rps-vals")]
    pub rps_range: RpsRange,

    /// Replica range used when scaling
    #[serde(default)]
    pub replicas: ReplicaRange,

    /// Current replica count, owned by the autoscaler
    #[serde(skip, default = "default_current_replicas")]
    pub current_replicas: u32,
}

fn default_current_replicas() -> u32 {
    1
}

/// Benchmark definition errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BenchmarkValidationError {
    #[error("benchmark {0} has no functions")]
    NoFunctions(String),

    #[error("benchmark {benchmark}: entry point {entry_point} is not one of its functions")]
    UnknownEntryPoint {
        benchmark: String,
        entry_point: String,
    },

    #[error("benchmark {benchmark}: invalid {field} range {min}..={max}")]
    InvalidRange {
        benchmark: String,
        field: &'static str,
        min: u32,
        max: u32,
    },
}

impl Benchmark {
    /// Index of the entry point within `functions`.
    pub fn entry_point_index(&self) -> Option<usize> {
        self.functions.iter().position(|f| f == &self.entry_point)
    }

    pub fn validate(&self) -> Result<(), BenchmarkValidationError> {
        if self.functions.is_empty() {
            return Err(BenchmarkValidationError::NoFunctions(self.name.clone()));
        }

        if self.entry_point_index().is_none() {
            return Err(BenchmarkValidationError::UnknownEntryPoint {
                benchmark: self.name.clone(),
                entry_point: self.entry_point.clone(),
            });
        }

        if self.rps_range.min == 0 || self.rps_range.min > self.rps_range.max {
            return Err(BenchmarkValidationError::InvalidRange {
                benchmark: self.name.clone(),
                field: "rps",
                min: self.rps_range.min,
                max: self.rps_range.max,
            });
        }

        if self.replicas.min == 0 || self.replicas.min > self.replicas.max {
            return Err(BenchmarkValidationError::InvalidRange {
                benchmark: self.name.clone(),
                field: "replicas",
                min: self.replicas.min,
                max: self.replicas.max,
            });
        }

        Ok(())
    }
}
