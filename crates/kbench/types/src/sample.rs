//! Node telemetry samples

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Average CPU time fractions across all cores, each in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuUtilization {
    pub idle: f64,
    pub user: f64,
    pub system: f64,
}

/// Summed network throughput across all devices, in bits per second
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkThroughput {
    pub tx_bps: f64,
    pub rx_bps: f64,
}

/// Utilization of one node over a sampling window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeSample {
    pub cpu: CpuUtilization,
    pub net: NetworkThroughput,
    /// Fraction of memory available
    pub mem: f64,
}

/// Per-node utilization for one trailing window, keyed by hostname
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvSample {
    pub window_secs: u64,
    pub nodes: BTreeMap<String, NodeSample>,
}

impl EnvSample {
    pub fn new(window_secs: u64) -> Self {
        Self {
            window_secs,
            nodes: BTreeMap::new(),
        }
    }

    pub fn node(&self, hostname: &str) -> Option<&NodeSample> {
        self.nodes.get(hostname)
    }

    /// Mean available-memory fraction across nodes.
    pub fn mean_mem_free(&self) -> Option<f64> {
        if self.nodes.is_empty() {
            return None;
        }
        let sum: f64 = self.nodes.values().map(|n| n.mem).sum();
        Some(sum / self.nodes.len() as f64)
    }
}
