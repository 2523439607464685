//! Latency sample files
//!
//! The generator writes one sample per line, in microseconds. Samples are
//! space separated when there is more than one on a line and may be quoted
//! with `|`.

use std::path::Path;

use crate::error::{InvokerError, InvokerResult};

/// Parse the contents of a latency file. `path` is only used in errors.
pub fn parse_latencies(text: &str, path: &Path) -> InvokerResult<Vec<f64>> {
    let mut samples = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        for field in line.split_whitespace() {
            let value = field.trim_matches('|');
            if value.is_empty() {
                continue;
            }
            let sample = value.parse::<f64>().map_err(|_| InvokerError::InvalidSample {
                path: path.to_path_buf(),
                line: idx + 1,
                value: field.to_string(),
            })?;
            samples.push(sample);
        }
    }
    Ok(samples)
}

/// Read every latency sample in `path`.
///
/// An empty file is an empty result, not an error; callers decide what a
/// run without responses means.
pub async fn get_latencies(path: &Path) -> InvokerResult<Vec<f64>> {
    let text = tokio::fs::read_to_string(path).await?;
    parse_latencies(&text, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbench_types::LatencyPercentiles;
    use std::io::Write;

    #[tokio::test]
    async fn test_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let samples = get_latencies(file.path()).await.unwrap();
        assert!(samples.is_empty());
        assert!(LatencyPercentiles::from_samples(&samples).is_none());
    }

    #[tokio::test]
    async fn test_reads_samples() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1520.5").unwrap();
        writeln!(file, "|2210|").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  987  ").unwrap();

        let samples = get_latencies(file.path()).await.unwrap();
        assert_eq!(samples, vec![1520.5, 2210.0, 987.0]);
    }

    #[test]
    fn test_fields_on_one_line() {
        let samples = parse_latencies("10 |20| 30\n", Path::new("x.csv")).unwrap();
        assert_eq!(samples, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_bad_sample() {
        let err = parse_latencies("10\nabc\n", Path::new("x.csv")).unwrap_err();
        assert!(matches!(err, InvokerError::InvalidSample { line: 2, .. }));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = get_latencies(&dir.path().join("absent.csv")).await.unwrap_err();
        assert!(matches!(err, InvokerError::Io(_)));
    }
}
