//! Load generator client

use kbench_remote::CommandRunner;
use kbench_types::InvocationResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::{InvokerError, InvokerResult};
use crate::latency::get_latencies;
use crate::report::parse_report;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokerConfig {
    /// Path to the generator binary
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Directory the generator runs in; endpoint and latency files live here
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Pass `-dbg` to the generator
    #[serde(default = "default_debug")]
    pub debug: bool,
}

fn default_binary() -> String {
    "./vSwarm/tools/invoker/invoker".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_debug() -> bool {
    true
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            work_dir: default_work_dir(),
            debug: default_debug(),
        }
    }
}

/// One load run against one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Used to name the endpoint and latency files
    pub name: String,
    pub host: String,
    pub port: u16,
    pub duration_secs: u64,
    pub rps: u32,
}

#[derive(Serialize)]
struct EndpointEntry<'a> {
    hostname: &'a str,
}

pub struct LoadInvocationClient {
    runner: Arc<dyn CommandRunner>,
    config: InvokerConfig,
}

impl LoadInvocationClient {
    /// `runner` must execute in `config.work_dir`.
    pub fn new(runner: Arc<dyn CommandRunner>, config: InvokerConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &InvokerConfig {
        &self.config
    }

    pub fn endpoints_file(&self, name: &str) -> PathBuf {
        self.config.work_dir.join(format!("endpoints_{}.json", name))
    }

    /// Run the generator and parse its report.
    #[instrument(skip(self, request), fields(benchmark = %request.name, rps = request.rps))]
    pub async fn invoke(&self, request: &InvocationRequest) -> InvokerResult<InvocationResult> {
        let endpoints = self.endpoints_file(&request.name);
        let body = serde_json::to_vec(&[EndpointEntry {
            hostname: &request.host,
        }])?;
        tokio::fs::write(&endpoints, body).await?;

        let mut args = Vec::with_capacity(11);
        if self.config.debug {
            args.push("-dbg".to_string());
        }
        args.extend([
            "-port".to_string(),
            request.port.to_string(),
            "-time".to_string(),
            request.duration_secs.to_string(),
            "-rps".to_string(),
            request.rps.to_string(),
            "-endpointsFile".to_string(),
            endpoints.to_string_lossy().into_owned(),
            "-latf".to_string(),
            format!("{}.csv", request.name),
        ]);

        let output = self.runner.run(&self.config.binary, &args).await?;
        if !output.success() {
            warn!(
                exit_code = ?output.exit_code,
                stderr = %output.stderr.trim(),
                "Invoker failed"
            );
            return Err(InvokerError::ProcessFailed {
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }

        let result = parse_report(&output.stdout, &self.config.work_dir)?;
        info!(
            issued = result.issued,
            completed = result.completed,
            real_rps = result.real_rps,
            target_rps = result.target_rps,
            latency_file = %result.latency_file.display(),
            "Invocation finished"
        );
        Ok(result)
    }

    /// Read back the samples of a finished invocation.
    pub async fn latencies(&self, result: &InvocationResult) -> InvokerResult<Vec<f64>> {
        get_latencies(&result.latency_file).await
    }

    /// Remove latency files (`rps*.csv`) and endpoint files left in the
    /// work directory. Returns how many were removed.
    pub async fn clear_outputs(&self) -> InvokerResult<usize> {
        clear_outputs(&self.config.work_dir).await
    }
}

async fn clear_outputs(dir: &Path) -> InvokerResult<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let latency = name.starts_with("rps") && name.ends_with(".csv");
        let endpoints = name.starts_with("endpoints_") && name.ends_with(".json");
        if (latency || endpoints) && entry.file_type().await?.is_file() {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}
