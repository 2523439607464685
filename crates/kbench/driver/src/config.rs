//! Experiment configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! file, then `KBENCH__<SECTION>__<KEY>` environment variables.

use kbench_autoscale::AutoscaleConfig;
use kbench_deploy::DeployerConfig;
use kbench_invoker::InvokerConfig;
use kbench_metrics::MetricsConfig;
use kbench_types::{Benchmark, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{DriverError, DriverResult};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KbenchConfig {
    #[serde(default)]
    pub driver: DriverConfig,

    #[serde(default)]
    pub deploy: DeployerConfig,

    #[serde(default)]
    pub autoscale: AutoscaleConfig,

    #[serde(default)]
    pub invoker: InvokerConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Benchmarks the driver draws from
    #[serde(default)]
    pub benchmarks: Vec<Benchmark>,
}

/// Scheduling and persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Experiment length in seconds
    #[serde(default = "default_duration")]
    pub duration_secs: u64,

    /// Interval between scheduling ticks in seconds
    #[serde(default = "default_tick")]
    pub tick_secs: u64,

    /// Where results are written
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Chance that a benchmark is drawn on a tick
    #[serde(default = "default_inclusion")]
    pub inclusion_probability: f64,

    /// Shortest invocation, in seconds
    #[serde(default = "default_min_invocation")]
    pub min_invocation_secs: u64,

    /// Longest invocation, in seconds
    #[serde(default = "default_max_invocation")]
    pub max_invocation_secs: u64,

    /// Force-delete pods during the final cleanup
    #[serde(default)]
    pub aggressive_cleanup: bool,

    /// Cluster size to expect in preflight; zero skips the check
    #[serde(default)]
    pub expected_nodes: usize,

    /// Retries of a failed experiment cycle
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_duration() -> u64 {
    3600
}

fn default_tick() -> u64 {
    30
}

fn default_output() -> PathBuf {
    PathBuf::from("results.json")
}

fn default_inclusion() -> f64 {
    0.5
}

fn default_min_invocation() -> u64 {
    10
}

fn default_max_invocation() -> u64 {
    60
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_duration(),
            tick_secs: default_tick(),
            output: default_output(),
            inclusion_probability: default_inclusion(),
            min_invocation_secs: default_min_invocation(),
            max_invocation_secs: default_max_invocation(),
            aggressive_cleanup: false,
            expected_nodes: 0,
            retry: RetryPolicy::default(),
        }
    }
}

impl DriverConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl KbenchConfig {
    /// Load configuration, layering an optional file and the environment
    /// over the defaults.
    pub fn load(path: Option<&str>) -> DriverResult<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&KbenchConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("KBENCH")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DriverResult<()> {
        for benchmark in &self.benchmarks {
            benchmark.validate()?;
        }
        let driver = &self.driver;
        if driver.min_invocation_secs == 0 || driver.min_invocation_secs > driver.max_invocation_secs {
            return Err(DriverError::Config(config::ConfigError::Message(format!(
                "invocation duration range {}..={} is invalid",
                driver.min_invocation_secs, driver.max_invocation_secs
            ))));
        }
        if !(0.0..=1.0).contains(&driver.inclusion_probability) {
            return Err(DriverError::Config(config::ConfigError::Message(format!(
                "inclusion_probability {} is outside 0..=1",
                driver.inclusion_probability
            ))));
        }
        Ok(())
    }

    pub fn benchmark(&self, name: &str) -> DriverResult<&Benchmark> {
        self.benchmarks
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| DriverError::UnknownBenchmark(name.to_string()))
    }
}
