//! Per-node utilization sampling

use dashmap::DashMap;
use futures::future::{join_all, try_join_all};
use kbench_types::{CpuUtilization, EnvSample, NetworkThroughput, NodeSample};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::backend::MetricsBackend;
use crate::error::{MetricsError, MetricsResult};

const MEM_TOTAL: &str = "node_memory_MemTotal_bytes";

fn cpu_query(mode: &str, window_secs: u64) -> String {
    format!(
        "avg(rate(node_cpu_seconds_total{{mode=\"{}\"}}[{}s]))",
        mode, window_secs
    )
}

fn net_query(direction: &str, window_secs: u64) -> String {
    format!(
        "sum(rate(node_network_{}_bytes_total[{}s]))*8",
        direction, window_secs
    )
}

fn mem_available_query(window_secs: u64) -> String {
    format!("node_memory_MemAvailable_bytes[{}s]", window_secs)
}

/// Samples every configured node through one backend.
pub struct MetricsSampler {
    backend: Arc<dyn MetricsBackend>,
    nodes: Vec<String>,
    /// Total memory per node; it does not change while we run
    mem_total: DashMap<String, f64>,
}

impl MetricsSampler {
    pub fn new(backend: Arc<dyn MetricsBackend>, nodes: Vec<String>) -> Self {
        Self {
            backend,
            nodes,
            mem_total: DashMap::new(),
        }
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Utilization of every node over the last `window_secs` seconds.
    #[instrument(skip(self), fields(nodes = self.nodes.len()))]
    pub async fn sample(&self, window_secs: u64) -> MetricsResult<EnvSample> {
        let samples = try_join_all(self.nodes.iter().map(|node| async move {
            let sample = self.sample_node(node, window_secs).await?;
            Ok::<_, MetricsError>((node.clone(), sample))
        }))
        .await?;

        let mut env = EnvSample::new(window_secs);
        env.nodes.extend(samples);
        debug!(window_secs, "Environment sampled");
        Ok(env)
    }

    async fn sample_node(&self, node: &str, window_secs: u64) -> MetricsResult<NodeSample> {
        let cpu = CpuUtilization {
            idle: self.scalar(node, &cpu_query("idle", window_secs)).await?,
            user: self.scalar(node, &cpu_query("user", window_secs)).await?,
            system: self.scalar(node, &cpu_query("system", window_secs)).await?,
        };
        let net = NetworkThroughput {
            tx_bps: self.scalar(node, &net_query("transmit", window_secs)).await?,
            rx_bps: self.scalar(node, &net_query("receive", window_secs)).await?,
        };

        let available = self.mean(node, &mem_available_query(window_secs)).await?;
        let total = self.mem_total(node).await?;

        Ok(NodeSample {
            cpu,
            net,
            mem: available / total,
        })
    }

    async fn mem_total(&self, node: &str) -> MetricsResult<f64> {
        if let Some(total) = self.mem_total.get(node) {
            return Ok(*total);
        }
        let total = self.scalar(node, MEM_TOTAL).await?;
        if total <= 0.0 {
            return Err(self.no_data(node, MEM_TOTAL));
        }
        self.mem_total.insert(node.to_string(), total);
        Ok(total)
    }

    async fn values(&self, node: &str, query: &str) -> MetricsResult<Vec<f64>> {
        let values = self.backend.instant_query(node, query).await?;
        if values.is_empty() {
            warn!(node, query, "Query returned no data");
            return Err(self.no_data(node, query));
        }
        Ok(values)
    }

    async fn scalar(&self, node: &str, query: &str) -> MetricsResult<f64> {
        Ok(self.values(node, query).await?[0])
    }

    async fn mean(&self, node: &str, query: &str) -> MetricsResult<f64> {
        let values = self.values(node, query).await?;
        Ok(values.iter().sum::<f64>() / values.len() as f64)
    }

    fn no_data(&self, node: &str, query: &str) -> MetricsError {
        MetricsError::NoData {
            query: query.to_string(),
            node: node.to_string(),
        }
    }

    /// Check that every node's Prometheus answers an `up` query.
    ///
    /// Reports every failing node rather than stopping at the first.
    pub async fn check_backends(&self) -> Vec<(String, MetricsResult<()>)> {
        let checks = self.nodes.iter().map(|node| async move {
            let result = self.values(node, "up").await.map(|_| ());
            match &result {
                Ok(()) => info!(node = %node, "Prometheus reachable"),
                Err(e) => warn!(node = %node, error = %e, "Prometheus check failed"),
            }
            (node.clone(), result)
        });
        join_all(checks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticBackend;

    fn sampler(backend: &Arc<StaticBackend>, nodes: &[&str]) -> MetricsSampler {
        MetricsSampler::new(
            backend.clone(),
            nodes.iter().map(|n| n.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn test_sample_all_nodes() {
        let backend = Arc::new(StaticBackend::new());
        backend.healthy_defaults();

        let env = sampler(&backend, &["node1", "node2"]).sample(60).await.unwrap();
        assert_eq!(env.window_secs, 60);
        assert_eq!(env.nodes.len(), 2);

        let node = env.node("node1").unwrap();
        assert_eq!(node.cpu.idle, 0.7);
        assert_eq!(node.cpu.user, 0.2);
        assert_eq!(node.cpu.system, 0.1);
        assert_eq!(node.net.tx_bps, 8000.0);
        assert_eq!(node.net.rx_bps, 16000.0);
        // mean available 3e9 over 8e9 total
        assert_eq!(node.mem, 0.375);
    }

    #[tokio::test]
    async fn test_query_shapes() {
        let backend = Arc::new(StaticBackend::new());
        backend.healthy_defaults();
        sampler(&backend, &["node1"]).sample(30).await.unwrap();

        let queries: Vec<String> = backend.queries().into_iter().map(|(_, q)| q).collect();
        assert!(queries.contains(&"avg(rate(node_cpu_seconds_total{mode=\"idle\"}[30s]))".to_string()));
        assert!(queries.contains(&"sum(rate(node_network_transmit_bytes_total[30s]))*8".to_string()));
        assert!(queries.contains(&"sum(rate(node_network_receive_bytes_total[30s]))*8".to_string()));
        assert!(queries.contains(&"node_memory_MemAvailable_bytes[30s]".to_string()));
    }

    #[tokio::test]
    async fn test_total_memory_is_cached() {
        let backend = Arc::new(StaticBackend::new());
        backend.healthy_defaults();
        let sampler = sampler(&backend, &["node1", "node2"]);

        sampler.sample(60).await.unwrap();
        sampler.sample(60).await.unwrap();
        assert_eq!(backend.queries_matching(MEM_TOTAL), 2);
        assert_eq!(backend.queries_matching("MemAvailable"), 4);
    }

    #[tokio::test]
    async fn test_no_data_is_an_error() {
        let backend = Arc::new(StaticBackend::new());
        backend.on_node("node2", "transmit", vec![]);
        backend.healthy_defaults();

        let err = sampler(&backend, &["node1", "node2"]).sample(60).await.unwrap_err();
        match err {
            MetricsError::NoData { query, node } => {
                assert_eq!(node, "node2");
                assert!(query.contains("transmit"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_check_backends() {
        let backend = Arc::new(StaticBackend::new());
        backend.healthy_defaults().down("node2");

        let results = sampler(&backend, &["node1", "node2"]).check_backends().await;
        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_ok());
        assert!(matches!(results[1].1, Err(MetricsError::Query { .. })));
    }
}
