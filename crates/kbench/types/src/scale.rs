//! Scale actions produced by a control loop

use serde::{Deserialize, Serialize};

/// Desired change to a replica count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleTarget {
    /// Add (or remove) replicas relative to the current count
    Delta(i32),
    /// Scale to an exact count
    Absolute(u32),
}

impl ScaleTarget {
    /// Replica count after applying this target. Never below one.
    pub fn apply(self, current: u32) -> u32 {
        match self {
            ScaleTarget::Delta(delta) => {
                let next = i64::from(current) + i64::from(delta);
                next.clamp(1, i64::from(u32::MAX)) as u32
            }
            ScaleTarget::Absolute(n) => n.max(1),
        }
    }
}

/// A scale target for one or more benchmarks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleAction {
    pub benchmarks: Vec<String>,
    pub target: ScaleTarget,
}

impl ScaleAction {
    pub fn delta(benchmark: impl Into<String>, delta: i32) -> Self {
        Self {
            benchmarks: vec![benchmark.into()],
            target: ScaleTarget::Delta(delta),
        }
    }

    pub fn absolute(benchmark: impl Into<String>, replicas: u32) -> Self {
        Self {
            benchmarks: vec![benchmark.into()],
            target: ScaleTarget::Absolute(replicas),
        }
    }

    pub fn applies_to(&self, benchmark: &str) -> bool {
        self.benchmarks.iter().any(|b| b == benchmark)
    }
}
