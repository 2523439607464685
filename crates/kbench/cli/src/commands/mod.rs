//! CLI command implementations

pub mod bootstrap;
pub mod cleanup;
pub mod invoke;
pub mod run;
