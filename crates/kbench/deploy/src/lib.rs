//! kbench Deploy - Benchmark manifests and orchestrator operations
//!
//! - [`ManifestSet`]: a function's typed workload, service and autoscaler,
//!   renamed consistently as one unit
//! - [`ManifestDeployer`]: render, deploy, delete and locate benchmark
//!   functions under minted names
//! - [`Orchestrator`]: the cluster operations everything else relies on,
//!   implemented by [`Kubectl`]

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]

pub mod deployer;
pub mod error;
pub mod kubectl;
pub mod manifest;
pub mod orchestrator;
pub mod rename;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use deployer::{DeployerConfig, Endpoint, FunctionArtifact, ManifestDeployer};
pub use error::{DeployError, DeployResult};
pub use kubectl::Kubectl;
pub use manifest::{AutoscalerManifest, ManifestSet, ServiceManifest, WorkloadManifest};
pub use orchestrator::{
    total_usage, DeploymentStatus, NodeStatus, Orchestrator, PodStatus, PodUsage, ResourceKind,
};
pub use rename::name_suffix;
