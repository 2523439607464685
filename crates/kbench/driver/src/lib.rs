//! kbench driver: concurrent experiment cycles against a live cluster
//!
//! - [`ExperimentDriver`]: the tick loop. Draws a workload mix, starts one
//!   worker per benchmark that is not already running, persists results and
//!   cleans up at the deadline.
//! - [`SharedState`]: active deployments and the result set, shared by `Arc`
//! - [`ControlEnvironment`]: observe/evaluate interface for an external
//!   scaling agent
//! - [`KbenchConfig`]: layered configuration for every component

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]

pub mod cleanup;
pub mod config;
pub mod context;
pub mod control_env;
pub mod driver;
pub mod error;
pub mod mix;
pub mod persist;
pub mod state;
pub mod worker;

pub use cleanup::{cleanup, CleanupOptions, CleanupReport};
pub use config::{DriverConfig, KbenchConfig, LoggingConfig};
pub use context::ExperimentContext;
pub use control_env::ControlEnvironment;
pub use driver::{invoke_once, ready_workers, ExperimentDriver, RunSummary};
pub use error::{DriverError, DriverResult};
pub use mix::{plan_tick, CyclePlan};
pub use persist::{read_results, write_results};
pub use state::SharedState;
pub use worker::{run_cycle, run_worker};
