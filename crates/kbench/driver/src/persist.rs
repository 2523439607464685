//! Durable result files

use kbench_types::ExperimentRecord;
use std::path::{Path, PathBuf};

use crate::error::DriverResult;

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `records` as a pretty-printed JSON array. The file is replaced in
/// one rename, so readers never see a partial write.
pub async fn write_results(path: &Path, records: &[ExperimentRecord]) -> DriverResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_vec_pretty(records)?;
    let tmp = temp_path(path);
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

pub async fn read_results(path: &Path) -> DriverResult<Vec<ExperimentRecord>> {
    let body = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kbench_types::{EnvSample, LatencyPercentiles, ResourceUsage, RpsStats};

    fn record(id: &str) -> ExperimentRecord {
        ExperimentRecord {
            timestamp: Utc::now(),
            benchmark_id: id.into(),
            benchmark: "fib".into(),
            resources: ResourceUsage::default(),
            replicas: 1,
            rps: RpsStats {
                issued: 10,
                completed: 10,
                real_rps: 1.0,
                target_rps: 1.0,
                drop_rate: 0.0,
            },
            latencies: LatencyPercentiles {
                p50: 1.0,
                p90: 2.0,
                p99: 3.0,
                p999: 4.0,
            },
            sla_violated: false,
            env: EnvSample::new(10),
        }
    }

    #[tokio::test]
    async fn test_replaces_previous_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("results.json");

        write_results(&path, &[record("fib-aaaaaaaaaa")]).await.unwrap();
        write_results(&path, &[record("fib-aaaaaaaaaa"), record("fib-bbbbbbbbbb")])
            .await
            .unwrap();

        let read = read_results(&path).await.unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[1].benchmark_id, "fib-bbbbbbbbbb");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_temp_path_is_a_sibling() {
        assert_eq!(
            temp_path(Path::new("/data/results.json")),
            PathBuf::from("/data/results.json.tmp")
        );
    }
}
