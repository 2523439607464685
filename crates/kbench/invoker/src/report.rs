//! Line grammar of the load generator's report
//!
//! Only three lines carry data. They may appear in any order, mixed with
//! debug output:
//!
//! ```text
//! The measured latencies are saved in rps98.30_fib.csv
//! completed requests: 1000, 950
//! target RPS: 98.3 / 100.0
//! ```

use kbench_types::InvocationResult;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::error::{InvokerError, InvokerResult};

static LATENCY_FILE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"The measured latencies are saved in (?P<path>\S*\.csv)"));

static COMPLETED: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(r"completed requests: (?P<issued>[0-9]+), (?P<completed>[0-9]+)")
});

static RPS: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(r"target RPS: (?P<real>[0-9]*\.?[0-9]+) / (?P<target>[0-9]*\.?[0-9]+)")
});

/// One classified report line
#[derive(Debug, Clone, PartialEq)]
pub enum ReportLine {
    LatencyFile(PathBuf),
    CompletedRequests { issued: u64, completed: u64 },
    Rps { real: f64, target: f64 },
    Other,
}

impl ReportLine {
    pub fn parse(line: &str) -> Self {
        Self::latency_file(line)
            .or_else(|| Self::completed(line))
            .or_else(|| Self::rps(line))
            .unwrap_or(ReportLine::Other)
    }

    fn latency_file(line: &str) -> Option<Self> {
        let caps = LATENCY_FILE.as_ref().ok()?.captures(line)?;
        Some(ReportLine::LatencyFile(PathBuf::from(caps.name("path")?.as_str())))
    }

    fn completed(line: &str) -> Option<Self> {
        let caps = COMPLETED.as_ref().ok()?.captures(line)?;
        Some(ReportLine::CompletedRequests {
            issued: caps.name("issued")?.as_str().parse().ok()?,
            completed: caps.name("completed")?.as_str().parse().ok()?,
        })
    }

    fn rps(line: &str) -> Option<Self> {
        let caps = RPS.as_ref().ok()?.captures(line)?;
        Some(ReportLine::Rps {
            real: caps.name("real")?.as_str().parse().ok()?,
            target: caps.name("target")?.as_str().parse().ok()?,
        })
    }
}

/// Build an [`InvocationResult`] from a full report.
///
/// A relative latency path is taken relative to `work_dir`, where the
/// generator ran. Later lines of the same kind win.
pub fn parse_report(stdout: &str, work_dir: &Path) -> InvokerResult<InvocationResult> {
    let mut latency_file = None;
    let mut counts = None;
    let mut rps = None;

    for line in stdout.lines() {
        match ReportLine::parse(line) {
            ReportLine::LatencyFile(path) => latency_file = Some(path),
            ReportLine::CompletedRequests { issued, completed } => counts = Some((issued, completed)),
            ReportLine::Rps { real, target } => rps = Some((real, target)),
            ReportLine::Other => {}
        }
    }

    let latency_file = latency_file.ok_or(InvokerError::MissingLatencyFile)?;
    let (issued, completed) = counts.ok_or(InvokerError::MissingField("completed requests"))?;
    let (real_rps, target_rps) = rps.ok_or(InvokerError::MissingField("target RPS"))?;

    let latency_file = if latency_file.is_relative() {
        work_dir.join(latency_file)
    } else {
        latency_file
    };

    Ok(InvocationResult {
        issued,
        completed,
        real_rps,
        target_rps,
        latency_file,
    })
}
