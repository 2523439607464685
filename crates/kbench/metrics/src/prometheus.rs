//! Prometheus HTTP API backend

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::backend::MetricsBackend;
use crate::error::{MetricsError, MetricsResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Port Prometheus listens on, on every node
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request timeout, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Trailing window sampled after each invocation, in seconds
    #[serde(default = "default_window")]
    pub window_secs: u64,

    /// Nodes to sample; empty means every worker node of the cluster
    #[serde(default)]
    pub nodes: Vec<String>,
}

fn default_port() -> u16 {
    9090
}

fn default_timeout() -> u64 {
    10
}

fn default_window() -> u64 {
    60
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            timeout_secs: default_timeout(),
            window_secs: default_window(),
            nodes: Vec::new(),
        }
    }
}

impl MetricsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    #[allow(dead_code)]
    result_type: String,
    result: ResultSet,
}

/// `result` is a list of series for vectors and matrices, and a single
/// point for scalars.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResultSet {
    Series(Vec<Series>),
    Point(Point),
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    value: Option<Point>,
    #[serde(default)]
    values: Vec<Point>,
}

/// `[<unix time>, "<value>"]`
#[derive(Debug, Deserialize)]
struct Point(#[allow(dead_code)] f64, String);

impl Point {
    fn parse(&self) -> MetricsResult<f64> {
        self.1
            .parse()
            .map_err(|_| MetricsError::BadValue(self.1.clone()))
    }
}

/// [`MetricsBackend`] talking to `http://<node>:<port>/api/v1/query`.
pub struct PrometheusBackend {
    client: Client,
    port: u16,
}

impl PrometheusBackend {
    pub fn new(config: &MetricsConfig) -> MetricsResult<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            port: config.port,
        })
    }

    fn url(&self, node: &str) -> String {
        format!("http://{}:{}/api/v1/query", node, self.port)
    }
}

#[async_trait]
impl MetricsBackend for PrometheusBackend {
    async fn instant_query(&self, node: &str, expr: &str) -> MetricsResult<Vec<f64>> {
        debug!(node, query = expr, "Prometheus query");
        let response: QueryResponse = self
            .client
            .get(self.url(node))
            .query(&[("query", expr)])
            .send()
            .await?
            .json()
            .await?;

        let failed = |message: String| MetricsError::Query {
            query: expr.to_string(),
            node: node.to_string(),
            message,
        };
        if response.status != "success" {
            return Err(failed(response.error.unwrap_or(response.status)));
        }
        let data = response
            .data
            .ok_or_else(|| failed("response has no data".into()))?;

        match data.result {
            ResultSet::Point(point) => Ok(vec![point.parse()?]),
            ResultSet::Series(series) => {
                let mut values = Vec::new();
                for s in &series {
                    for point in s.value.iter().chain(&s.values) {
                        values.push(point.parse()?);
                    }
                }
                Ok(values)
            }
        }
    }
}
