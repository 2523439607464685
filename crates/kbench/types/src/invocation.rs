//! Load-generator results and latency statistics

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What one invocation of the load generator reported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    /// Requests issued
    pub issued: u64,
    /// Requests that completed
    pub completed: u64,
    /// Achieved requests per second
    pub real_rps: f64,
    /// Requested requests per second
    pub target_rps: f64,
    /// File holding one latency sample (microseconds) per line
    pub latency_file: PathBuf,
}

impl InvocationResult {
    /// Fraction of issued requests that did not complete.
    pub fn drop_rate(&self) -> f64 {
        if self.issued == 0 {
            return 0.0;
        }
        self.issued.saturating_sub(self.completed) as f64 / self.issued as f64
    }
}

/// Tail latency summary, in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    pub p999: f64,
}

impl LatencyPercentiles {
    /// Summarize latency samples.
    ///
    /// Returns `None` for an empty sample set: an invocation that produced no
    /// responses has no percentiles.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        Some(Self {
            p50: pick(&sorted, 0.5),
            p90: pick(&sorted, 0.9),
            p99: pick(&sorted, 0.99),
            p999: pick(&sorted, 0.999),
        })
    }
}

fn pick(sorted: &[f64], quantile: f64) -> f64 {
    let idx = ((sorted.len() as f64) * quantile) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_samples_have_no_percentiles() {
        assert!(LatencyPercentiles::from_samples(&[]).is_none());
    }

    #[test]
    fn test_percentile_indexing() {
        let samples: Vec<f64> = (1..=1000).rev().map(f64::from).collect();
        let p = LatencyPercentiles::from_samples(&samples).unwrap();
        assert_eq!(p.p50, 501.0);
        assert_eq!(p.p90, 901.0);
        assert_eq!(p.p99, 991.0);
        assert_eq!(p.p999, 1000.0);
    }

    #[test]
    fn test_single_sample() {
        let p = LatencyPercentiles::from_samples(&[42.0]).unwrap();
        assert_eq!(p.p50, 42.0);
        assert_eq!(p.p999, 42.0);
    }

    #[test]
    fn test_drop_rate() {
        let result = InvocationResult {
            issued: 1000,
            completed: 950,
            real_rps: 98.3,
            target_rps: 100.0,
            latency_file: PathBuf::from("rps100.csv"),
        };
        assert!((result.drop_rate() - 0.05).abs() < 1e-9);

        let idle = InvocationResult {
            issued: 0,
            completed: 0,
            ..result
        };
        assert_eq!(idle.drop_rate(), 0.0);
    }

    proptest! {
        #[test]
        fn percentiles_are_monotonic(samples in prop::collection::vec(0.0f64..1e7, 1..500)) {
            let p = LatencyPercentiles::from_samples(&samples).unwrap();
            prop_assert!(p.p50 <= p.p90);
            prop_assert!(p.p90 <= p.p99);
            prop_assert!(p.p99 <= p.p999);
        }
    }
}
