//! Error types for the indexing pipeline.

use feed_storage::StorageError;
use thiserror::Error;

/// Errors that can occur in the indexing pipeline
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The latest index record points at a source entry that does not exist
    #[error("Cursor error: index feed {feed_id} points at missing entry {indexed}")]
    DanglingCursor {
        /// Index feed holding the record
        feed_id: String,
        /// Key the record points at
        indexed: String,
    },

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Payload does not follow the feed format
    #[error("Format error: {0}")]
    Format(String),

    /// An entry at or below the cursor reached the writer
    #[error("Out of order: entry {sequence} is not after cursor {cursor}")]
    OutOfOrder {
        /// Sequence of the rejected entry
        sequence: u64,
        /// Cursor at the time
        cursor: u64,
    },

    /// The source log dropped its live subscription
    #[error("Live subscription closed")]
    LiveClosed,
}

impl From<serde_json::Error> for IndexingError {
    fn from(err: serde_json::Error) -> Self {
        IndexingError::Serialization(err.to_string())
    }
}
