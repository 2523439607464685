//! Autoscale controller configuration

use kbench_types::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoscaleConfig {
    /// Interval between convergence polls, in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Budget for one convergence, in seconds
    #[serde(default = "default_scale_timeout")]
    pub scale_timeout_secs: u64,

    /// How long a deleted pod may stay listed, in seconds
    #[serde(default = "default_gone_timeout")]
    pub gone_timeout_secs: u64,

    /// Interval between "is it gone" checks, in milliseconds
    #[serde(default = "default_gone_poll")]
    pub gone_poll_ms: u64,

    /// Retry policy for `converge`
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_scale_timeout() -> u64 {
    300
}

fn default_gone_timeout() -> u64 {
    60
}

fn default_gone_poll() -> u64 {
    500
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            scale_timeout_secs: default_scale_timeout(),
            gone_timeout_secs: default_gone_timeout(),
            gone_poll_ms: default_gone_poll(),
            retry: RetryPolicy::default(),
        }
    }
}

impl AutoscaleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn scale_timeout(&self) -> Duration {
        Duration::from_secs(self.scale_timeout_secs)
    }

    pub fn gone_timeout(&self) -> Duration {
        Duration::from_secs(self.gone_timeout_secs)
    }

    pub fn gone_poll(&self) -> Duration {
        Duration::from_millis(self.gone_poll_ms)
    }
}
