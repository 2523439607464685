//! kbench autoscale: drive a deployment's replica count to a target
//!
//! Convergence is a poll loop bounded by a caller-supplied deadline. Crashed
//! pods are remediated inside the loop: deleted, confirmed gone, and replaced
//! by rescaling.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]

pub mod config;
pub mod controller;
pub mod error;

pub use config::AutoscaleConfig;
pub use controller::{AutoscaleController, ScaleReport};
pub use error::{AutoscaleError, AutoscaleResult};
