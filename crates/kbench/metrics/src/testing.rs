//! Canned metrics backend for tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;

use crate::backend::MetricsBackend;
use crate::error::{MetricsError, MetricsResult};

/// [`MetricsBackend`] answering from fixed rules.
///
/// A rule matches when its node matches (or is unset) and the query
/// contains its pattern. The first matching rule wins; a query no rule
/// matches returns no values.
#[derive(Debug, Default)]
pub struct StaticBackend {
    rules: Mutex<Vec<(Option<String>, String, Vec<f64>)>>,
    down: Mutex<HashSet<String>>,
    queries: Mutex<Vec<(String, String)>>,
}

impl StaticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, pattern: &str, values: Vec<f64>) -> &Self {
        self.rules.lock().push((None, pattern.to_string(), values));
        self
    }

    pub fn on_node(&self, node: &str, pattern: &str, values: Vec<f64>) -> &Self {
        self.rules
            .lock()
            .push((Some(node.to_string()), pattern.to_string(), values));
        self
    }

    /// Fail every query to `node`.
    pub fn down(&self, node: &str) -> &Self {
        self.down.lock().insert(node.to_string());
        self
    }

    /// A healthy node: answers `up` and every utilization query.
    pub fn healthy_defaults(&self) -> &Self {
        self.on("mode=\"idle\"", vec![0.7])
            .on("mode=\"user\"", vec![0.2])
            .on("mode=\"system\"", vec![0.1])
            .on("transmit", vec![8000.0])
            .on("receive", vec![16000.0])
            .on("MemAvailable", vec![2.0e9, 4.0e9])
            .on("MemTotal", vec![8.0e9])
            .on("up", vec![1.0])
    }

    /// Recorded `(node, query)` pairs, in call order.
    pub fn queries(&self) -> Vec<(String, String)> {
        self.queries.lock().clone()
    }

    pub fn queries_matching(&self, pattern: &str) -> usize {
        self.queries
            .lock()
            .iter()
            .filter(|(_, q)| q.contains(pattern))
            .count()
    }
}

#[async_trait]
impl MetricsBackend for StaticBackend {
    async fn instant_query(&self, node: &str, expr: &str) -> MetricsResult<Vec<f64>> {
        self.queries.lock().push((node.to_string(), expr.to_string()));
        if self.down.lock().contains(node) {
            return Err(MetricsError::Query {
                query: expr.to_string(),
                node: node.to_string(),
                message: "connection refused".into(),
            });
        }
        let rules = self.rules.lock();
        let values = rules
            .iter()
            .find(|(n, pattern, _)| n.as_deref().map_or(true, |n| n == node) && expr.contains(pattern.as_str()))
            .map(|(_, _, values)| values.clone())
            .unwrap_or_default();
        Ok(values)
    }
}
