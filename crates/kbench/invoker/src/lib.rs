//! kbench invoker: run the vSwarm load generator and read what it reports
//!
//! The generator prints a short text report and writes one latency sample
//! per line to a CSV file. [`LoadInvocationClient`] runs it against one
//! endpoint, parses the report into an [`InvocationResult`] and reads the
//! samples back.
//!
//! [`InvocationResult`]: kbench_types::InvocationResult

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]

pub mod client;
pub mod error;
pub mod latency;
pub mod report;

pub use client::{InvocationRequest, InvokerConfig, LoadInvocationClient};
pub use error::{InvokerError, InvokerResult};
pub use latency::{get_latencies, parse_latencies};
pub use report::{parse_report, ReportLine};
