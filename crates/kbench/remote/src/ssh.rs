//! SSH-backed remote execution
//!
//! Commands are run through the system `ssh` client with key-based
//! authentication. Host-key prompts are disabled so unattended bootstraps of
//! freshly provisioned machines do not hang.

use async_trait::async_trait;
use kbench_types::{Node, SshCredentials};
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::error::{RemoteError, RemoteResult};
use crate::executor::{RemoteExecutor, RemoteSession};
use crate::output::CommandOutput;

/// Options for the `ssh` client
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// Client binary
    pub binary: String,

    /// Connection establishment timeout
    pub connect_timeout: Duration,

    /// Kill non-interactive commands that run longer than this
    pub command_timeout: Option<Duration>,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            binary: "ssh".to_string(),
            connect_timeout: Duration::from_secs(30),
            command_timeout: None,
        }
    }
}

/// [`RemoteExecutor`] that shells out to `ssh`.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    options: SshOptions,
    hosts: HashMap<String, SshCredentials>,
}

impl SshExecutor {
    pub fn new(options: SshOptions) -> Self {
        Self {
            options,
            hosts: HashMap::new(),
        }
    }

    /// Executor that knows how to reach every node in `nodes`.
    pub fn for_nodes<'a>(options: SshOptions, nodes: impl IntoIterator<Item = &'a Node>) -> Self {
        let mut executor = Self::new(options);
        for node in nodes {
            executor.add_host(node.hostname.clone(), node.credentials.clone());
        }
        executor
    }

    pub fn add_host(&mut self, host: impl Into<String>, credentials: SshCredentials) {
        self.hosts.insert(host.into(), credentials);
    }

    fn build_args(&self, host: &str, command: &str) -> RemoteResult<Vec<String>> {
        let creds = self
            .hosts
            .get(host)
            .ok_or_else(|| RemoteError::UnknownHost(host.to_string()))?;

        Ok(vec![
            "-i".to_string(),
            creds.key_file.display().to_string(),
            "-p".to_string(),
            creds.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.options.connect_timeout.as_secs().max(1)),
            format!("{}@{}", creds.username, host),
            command.to_string(),
        ])
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.options.binary);
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, source: std::io::Error) -> RemoteError {
        RemoteError::Spawn {
            program: self.options.binary.clone(),
            source,
        }
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    #[instrument(skip(self, command), fields(host = %host))]
    async fn execute(&self, host: &str, command: &str) -> RemoteResult<CommandOutput> {
        let args = self.build_args(host, command)?;
        let mut cmd = self.command(&args);
        cmd.stdin(Stdio::null());

        let child = cmd.spawn().map_err(|e| self.spawn_error(e))?;
        let io_err = |source| RemoteError::Io {
            target: host.to_string(),
            source,
        };

        let output = match self.options.command_timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| RemoteError::Timeout {
                    target: host.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })?
                .map_err(io_err)?,
            None => child.wait_with_output().await.map_err(io_err)?,
        };

        let output = CommandOutput::from_process(output);
        debug!(exit_code = ?output.exit_code, "Remote command finished");
        Ok(output)
    }

    #[instrument(skip(self, command), fields(host = %host))]
    async fn spawn(&self, host: &str, command: &str) -> RemoteResult<Box<dyn RemoteSession>> {
        let args = self.build_args(host, command)?;
        let mut cmd = self.command(&args);
        cmd.stdin(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;
        let stdin = child.stdin.take();

        // Drain output continuously so a chatty command cannot block on a full pipe.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        debug!("Interactive session started");
        Ok(Box::new(SshSession {
            host: host.to_string(),
            child,
            stdin,
            stdout,
            stderr,
        }))
    }
}

fn drain<R>(mut reader: R) -> JoinHandle<std::io::Result<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    })
}

/// Interactive command started by [`SshExecutor::spawn`].
pub struct SshSession {
    host: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    stderr: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
}

impl SshSession {
    fn io_err(&self, source: std::io::Error) -> RemoteError {
        RemoteError::Io {
            target: self.host.clone(),
            source,
        }
    }

    async fn collect(
        &self,
        handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    ) -> RemoteResult<String> {
        let Some(handle) = handle else {
            return Ok(String::new());
        };
        let bytes = handle
            .await
            .map_err(|e| RemoteError::Reader(e.to_string()))?
            .map_err(|e| self.io_err(e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    fn host(&self) -> &str {
        &self.host
    }

    async fn send(&mut self, input: &str) -> RemoteResult<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(RemoteError::InputClosed(self.host.clone()));
        };
        let result = async {
            stdin.write_all(input.as_bytes()).await?;
            stdin.flush().await
        }
        .await;
        result.map_err(|e| self.io_err(e))
    }

    async fn close_input(&mut self) -> RemoteResult<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.shutdown().await.map_err(|e| self.io_err(e))?;
        }
        Ok(())
    }

    async fn wait(&mut self) -> RemoteResult<CommandOutput> {
        self.stdin = None;
        let status = self.child.wait().await.map_err(|e| self.io_err(e))?;

        let stdout_handle = self.stdout.take();
        let stderr_handle = self.stderr.take();
        let stdout = self.collect(stdout_handle).await?;
        let stderr = self.collect(stderr_handle).await?;

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code: status.code(),
        })
    }
}
