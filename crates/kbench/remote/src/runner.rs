//! Local program execution

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::{RemoteError, RemoteResult};
use crate::output::CommandOutput;

/// Runs a program on the local machine.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> RemoteResult<CommandOutput>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct LocalRunner {
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl LocalRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Kill commands that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn run(&self, program: &str, args: &[String]) -> RemoteResult<CommandOutput> {
        debug!(program, args = ?args, "Running local command");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|source| RemoteError::Spawn {
            program: program.to_string(),
            source,
        })?;

        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| RemoteError::Timeout {
                    target: program.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })?,
            None => child.wait_with_output().await,
        }
        .map_err(|source| RemoteError::Io {
            target: program.to_string(),
            source,
        })?;

        Ok(CommandOutput::from_process(output))
    }
}
