//! kbench Types - Core types for serverless testbed experiments
//!
//! kbench drives experiments on a Kubernetes/Knative testbed: it forms a
//! cluster over SSH, deploys benchmark functions, drives load against them,
//! samples node telemetry and adapts replica counts while pods crash and
//! requests drop.
//!
//! ## Key Concepts
//!
//! - **Node**: a testbed host and its role (master or worker)
//! - **Benchmark**: a named set of functions with an entry point, SLA and RPS range
//! - **DeploymentName**: a benchmark or function name carrying a random suffix
//! - **ScaleAction**: a replica delta or absolute target for benchmarks
//! - **InvocationResult**: what one run of the load generator reported
//! - **EnvSample**: per-node CPU, network and memory utilization
//! - **ExperimentRecord**: one persisted row of experiment output
//! - **Deadline / RetryPolicy**: per-call timeouts and bounded retries

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod benchmark;
pub mod deadline;
pub mod ids;
pub mod invocation;
pub mod node;
pub mod outcome;
pub mod record;
pub mod retry;
pub mod sample;
pub mod scale;

pub use benchmark::{Benchmark, BenchmarkValidationError, ReplicaRange, RpsRange, Sla};
pub use deadline::Deadline;
pub use ids::{DeploymentName, RunId, SUFFIX_LEN};
pub use invocation::{InvocationResult, LatencyPercentiles};
pub use node::{Node, NodeRole, SshCredentials};
pub use outcome::CycleOutcome;
pub use record::{ExperimentRecord, ResourceUsage, RpsStats};
pub use retry::RetryPolicy;
pub use sample::{CpuUtilization, EnvSample, NetworkThroughput, NodeSample};
pub use scale::{ScaleAction, ScaleTarget};
