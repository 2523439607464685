//! Error types for metric queries

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    /// The query ran but matched no series
    #[error("No data for `{query}` on {node}")]
    NoData { query: String, node: String },

    /// Prometheus answered with an error status
    #[error("Query `{query}` on {node} failed: {message}")]
    Query {
        query: String,
        node: String,
        message: String,
    },

    /// A sample value was not a number
    #[error("Unparseable sample value '{0}'")]
    BadValue(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for metric queries
pub type MetricsResult<T> = Result<T, MetricsError>;
