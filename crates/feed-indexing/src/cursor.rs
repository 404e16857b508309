//! Cursor tracking for index feeds.
//!
//! The cursor is the sequence number of the newest source entry already
//! reflected in an index feed. It is never stored on its own: it is derived
//! from the feed's latest record, so the index feed is the only persisted
//! progress and a restart resumes exactly after the last written record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use feed_storage::{IndexFeedStore, SourceLog};
use feed_types::IndexFeedInfo;

use crate::error::IndexingError;
use crate::format::FeedFormat;

/// In-memory progress of one index feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexCursor {
    /// Source sequence of the newest indexed entry (0 = nothing indexed)
    pub sequence: u64,

    /// Records written since this cursor was resolved
    pub written: u64,

    /// Time of the last write (milliseconds since epoch for JSON compatibility)
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_written_at: Option<DateTime<Utc>>,
}

impl IndexCursor {
    /// Cursor positioned at `sequence` with nothing written yet.
    pub fn at(sequence: u64) -> Self {
        Self {
            sequence,
            written: 0,
            last_written_at: None,
        }
    }

    /// Record that the entry at `sequence` was indexed.
    ///
    /// The cursor only moves forward.
    pub fn advance(&mut self, sequence: u64) -> Result<(), IndexingError> {
        if sequence <= self.sequence {
            return Err(IndexingError::OutOfOrder {
                sequence,
                cursor: self.sequence,
            });
        }
        self.sequence = sequence;
        self.written += 1;
        self.last_written_at = Some(Utc::now());
        Ok(())
    }
}

/// Determines where in the source log an index feed left off.
pub struct CursorResolver {
    log: Arc<dyn SourceLog>,
    feeds: Arc<dyn IndexFeedStore>,
    format: Arc<dyn FeedFormat>,
}

impl CursorResolver {
    /// Create a resolver over the given collaborators.
    pub fn new(
        log: Arc<dyn SourceLog>,
        feeds: Arc<dyn IndexFeedStore>,
        format: Arc<dyn FeedFormat>,
    ) -> Self {
        Self { log, feeds, format }
    }

    /// Resolve the cursor of `feed`.
    ///
    /// Returns 0 for an empty feed. A latest record pointing at an entry
    /// missing from the source log is an error, never a restart from 0.
    pub async fn resolve(&self, feed: &IndexFeedInfo) -> Result<u64, IndexingError> {
        let Some(payload) = self.feeds.latest_record(&feed.feed_id).await? else {
            debug!(feed_id = %feed.feed_id, "No index records, starting from 0");
            return Ok(0);
        };

        let record = self.format.decode(&payload)?;
        let msg = self.log.get(&record.indexed).await?.ok_or_else(|| {
            IndexingError::DanglingCursor {
                feed_id: feed.feed_id.clone(),
                indexed: record.indexed.to_string(),
            }
        })?;

        info!(
            feed_id = %feed.feed_id,
            indexed = %record.indexed,
            cursor = msg.sequence,
            "Resolved cursor"
        );
        Ok(msg.sequence)
    }
}
