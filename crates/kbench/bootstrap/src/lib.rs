//! kbench Bootstrap - Testbed cluster formation
//!
//! Turns a set of reserved hosts into a Kubernetes/Knative cluster:
//!
//! 1. Clean and provision every node in parallel
//! 2. Configure the workers in parallel
//! 3. Start cluster initialization on the master and wait for it to print
//!    the join command
//! 4. Join the workers one at a time, then confirm on the master
//! 5. Install vSwarm on the master and metrics agents everywhere
//!
//! Progress is tracked by [`ClusterState`]; any fatal failure moves it to
//! `Aborted`. Every command's output goes to a single [`LogSink`].

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]

pub mod bootstrapper;
pub mod config;
pub mod error;
pub mod join;
pub mod log_sink;
pub mod scripts;
pub mod state;

pub use bootstrapper::{BootstrapEvent, BootstrapOptions, BootstrapReport, ClusterBootstrapper};
pub use config::{TestbedConfig, Topology};
pub use error::{BootstrapError, BootstrapResult};
pub use join::extract_join_command;
pub use log_sink::LogSink;
pub use scripts::ProvisionScripts;
pub use state::ClusterState;
