//! Outcome of a control cycle as seen by the driver

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of one scale/invoke/sample cycle.
///
/// Component errors are logged where they happen and folded into one of
/// these three cases at the controller boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleOutcome {
    Success,
    /// The cycle failed in a way that is expected to clear up
    Retry { reason: String },
    /// The cycle cannot succeed without intervention
    Abort { reason: String },
}

impl CycleOutcome {
    pub fn retry(reason: impl Into<String>) -> Self {
        Self::Retry {
            reason: reason.into(),
        }
    }

    pub fn abort(reason: impl Into<String>) -> Self {
        Self::Abort {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Retry { reason } => write!(f, "retry: {}", reason),
            Self::Abort { reason } => write!(f, "abort: {}", reason),
        }
    }
}
