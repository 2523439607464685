//! kbench Remote - Command execution on testbed hosts
//!
//! Everything kbench does to the outside world ends up as a command: shell
//! scripts on SSH-reachable hosts, `kubectl` calls and load-generator runs on
//! the local machine. This crate provides the two seams those calls go
//! through:
//!
//! - [`RemoteExecutor`]: runs a command on a named host, optionally as an
//!   interactive [`RemoteSession`] whose stdin can be written later
//! - [`CommandRunner`]: runs a local program with arguments
//!
//! A non-zero exit status is not an error at this layer. It is reported in
//! [`CommandOutput`] and judged by the caller.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]

pub mod error;
pub mod executor;
pub mod output;
pub mod runner;
pub mod ssh;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::{RemoteError, RemoteResult};
pub use executor::{RemoteExecutor, RemoteSession};
pub use output::CommandOutput;
pub use runner::{CommandRunner, LocalRunner};
pub use ssh::{SshExecutor, SshOptions};
