//! Query backend seam

use async_trait::async_trait;

use crate::error::MetricsResult;

/// Source of node metrics
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Evaluate `expr` on `node` and return every sample value it produced,
    /// across all series. Range vectors contribute each of their points.
    async fn instant_query(&self, node: &str, expr: &str) -> MetricsResult<Vec<f64>>;
}
