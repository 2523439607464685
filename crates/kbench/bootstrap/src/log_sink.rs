//! Append-only command log shared by all bootstrap tasks

use chrono::Utc;
use kbench_remote::CommandOutput;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Thread-safe log of every command's output. One mutex guards the file, so
/// entries from parallel phases never interleave.
#[derive(Debug)]
pub struct LogSink {
    file: Mutex<Option<File>>,
}

impl LogSink {
    /// Create (truncating) the log file at `path`.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(Some(file)),
        })
    }

    /// A sink that drops everything.
    pub fn discard() -> Self {
        Self {
            file: Mutex::new(None),
        }
    }

    pub fn record(&self, host: &str, label: &str, output: &CommandOutput) -> io::Result<()> {
        let mut guard = self.file.lock();
        let Some(file) = guard.as_mut() else {
            return Ok(());
        };

        writeln!(
            file,
            "=== {} {} [{}] exit={:?}",
            Utc::now().to_rfc3339(),
            host,
            label,
            output.exit_code
        )?;
        write!(file, "STDOUT: {}", output.stdout)?;
        if !output.stdout.ends_with('\n') {
            writeln!(file)?;
        }
        write!(file, "STDERR: {}", output.stderr)?;
        if !output.stderr.ends_with('\n') {
            writeln!(file)?;
        }
        file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_entries_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bootstrap.log");
        let sink = Arc::new(LogSink::create(&path).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    let out = CommandOutput {
                        stdout: format!("line-{i}-a\nline-{i}-b\n"),
                        stderr: String::new(),
                        exit_code: Some(0),
                    };
                    sink.record(&format!("node{i}"), "provision", &out).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        for i in 0..8 {
            let a = format!("line-{i}-a\nline-{i}-b\n");
            assert!(contents.contains(&a), "entry {i} was split");
        }
        assert_eq!(contents.matches("STDERR: ").count(), 8);
    }

    #[test]
    fn test_discard() {
        LogSink::discard()
            .record("node0", "noop", &CommandOutput::ok("x"))
            .unwrap();
    }
}
