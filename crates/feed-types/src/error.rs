//! Error types for the index-feeds system.

use thiserror::Error;

/// Unified error type for domain-level operations.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Query does not conform to the query grammar, or targets another author
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
