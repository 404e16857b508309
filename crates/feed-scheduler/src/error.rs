//! Error types for the scheduler crate.
//!
//! Provides unified error handling for the engine's entry points: query
//! validation, index feed resolution and task startup.

use feed_indexing::IndexingError;
use feed_storage::StorageError;
use feed_types::FeedError;
use thiserror::Error;

/// Errors that can occur during scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Malformed query, or a query for another author
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Finding or creating the index feed failed
    #[error("Subfeed error: {0}")]
    Subfeed(#[from] StorageError),

    /// Task startup or pipeline failure
    #[error("Indexing error: {0}")]
    Indexing(#[from] IndexingError),

    /// The query's task exited before its backlog drained
    #[error("Indexing task exited before its backlog drained: {0}")]
    TaskExited(String),

    /// The engine has been shut down
    #[error("Scheduler has shut down")]
    ShutDown,
}

impl From<FeedError> for SchedulerError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::InvalidQuery(msg) => SchedulerError::InvalidQuery(msg),
            other => SchedulerError::InvalidQuery(other.to_string()),
        }
    }
}
