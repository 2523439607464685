//! Persisted experiment output

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::invocation::{InvocationResult, LatencyPercentiles};
use crate::sample::EnvSample;

/// Summed pod resource usage for one deployment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu_millicores: u64,
    pub memory_bytes: u64,
}

impl std::ops::Add for ResourceUsage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            cpu_millicores: self.cpu_millicores + rhs.cpu_millicores,
            memory_bytes: self.memory_bytes + rhs.memory_bytes,
        }
    }
}

impl std::iter::Sum for ResourceUsage {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, u| acc + u)
    }
}

/// Request counts and rates from one invocation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RpsStats {
    pub issued: u64,
    pub completed: u64,
    pub real_rps: f64,
    pub target_rps: f64,
    pub drop_rate: f64,
}

impl From<&InvocationResult> for RpsStats {
    fn from(result: &InvocationResult) -> Self {
        Self {
            issued: result.issued,
            completed: result.completed,
            real_rps: result.real_rps,
            target_rps: result.target_rps,
            drop_rate: result.drop_rate(),
        }
    }
}

/// One completed (benchmark, scale, invocation) observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub timestamp: DateTime<Utc>,
    /// Minted deployment name
    pub benchmark_id: String,
    /// Logical benchmark name
    pub benchmark: String,
    pub resources: ResourceUsage,
    pub replicas: u32,
    pub rps: RpsStats,
    pub latencies: LatencyPercentiles,
    pub sla_violated: bool,
    pub env: EnvSample,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_usage_sum() {
        let total: ResourceUsage = vec![
            ResourceUsage {
                cpu_millicores: 12,
                memory_bytes: 1024,
            },
            ResourceUsage {
                cpu_millicores: 3,
                memory_bytes: 2048,
            },
        ]
        .into_iter()
        .sum();
        assert_eq!(total.cpu_millicores, 15);
        assert_eq!(total.memory_bytes, 3072);
    }
}
