//! Remote execution seam

use async_trait::async_trait;

use crate::error::RemoteResult;
use crate::output::CommandOutput;

/// Runs commands on named testbed hosts over an authenticated session.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `command` on `host` and wait for it to finish.
    async fn execute(&self, host: &str, command: &str) -> RemoteResult<CommandOutput>;

    /// Start `command` on `host` without waiting, keeping its stdin open.
    async fn spawn(&self, host: &str, command: &str) -> RemoteResult<Box<dyn RemoteSession>>;
}

/// A command started with [`RemoteExecutor::spawn`].
#[async_trait]
pub trait RemoteSession: Send {
    /// Host the session runs on.
    fn host(&self) -> &str;

    /// Write `input` to the command's stdin.
    async fn send(&mut self, input: &str) -> RemoteResult<()>;

    /// Close stdin so the command sees end-of-file.
    async fn close_input(&mut self) -> RemoteResult<()>;

    /// Wait for the command to exit and collect its output.
    async fn wait(&mut self) -> RemoteResult<CommandOutput>;
}
