//! Index writer.
//!
//! Turns merged items into index-pointer records appended to one index feed.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use feed_storage::IndexFeedStore;
use feed_types::{IndexFeedInfo, IndexRecord};

use crate::cursor::IndexCursor;
use crate::error::IndexingError;
use crate::format::FeedFormat;
use crate::merge::MergedItem;

/// What [`IndexWriter::write_if_entry`] did with an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A record was appended
    Written {
        /// Source sequence the record points at
        sequence: u64,
        /// Position of the record in the index feed
        position: u64,
    },
    /// The item was the sync point; nothing was written
    Drained,
    /// Cancelled before the append was issued
    Cancelled,
}

/// Appends index records for one index feed.
///
/// Writes are issued one at a time; the cursor advances only after an append
/// succeeds.
pub struct IndexWriter {
    feeds: Arc<dyn IndexFeedStore>,
    format: Arc<dyn FeedFormat>,
    feed: IndexFeedInfo,
    cursor: IndexCursor,
}

impl IndexWriter {
    /// Create a writer for `feed`, positioned at `cursor`.
    pub fn new(
        feeds: Arc<dyn IndexFeedStore>,
        format: Arc<dyn FeedFormat>,
        feed: IndexFeedInfo,
        cursor: u64,
    ) -> Self {
        Self {
            feeds,
            format,
            feed,
            cursor: IndexCursor::at(cursor),
        }
    }

    /// Current cursor.
    pub fn cursor(&self) -> &IndexCursor {
        &self.cursor
    }

    /// Feed being written.
    pub fn feed(&self) -> &IndexFeedInfo {
        &self.feed
    }

    /// Write a record if `item` is an entry.
    ///
    /// Failures are returned as-is and are not retried.
    pub async fn write_if_entry(
        &mut self,
        item: MergedItem,
        cancel: &CancellationToken,
    ) -> Result<WriteOutcome, IndexingError> {
        let msg = match item {
            MergedItem::SyncPoint => return Ok(WriteOutcome::Drained),
            MergedItem::Entry(msg) => msg,
        };

        if msg.sequence <= self.cursor.sequence {
            return Err(IndexingError::OutOfOrder {
                sequence: msg.sequence,
                cursor: self.cursor.sequence,
            });
        }
        if cancel.is_cancelled() {
            return Ok(WriteOutcome::Cancelled);
        }

        let record = IndexRecord::pointer(msg.key.clone());
        let payload = self.format.encode(&record, &self.feed.keys)?;
        let position = self.feeds.append_record(&self.feed.feed_id, payload).await?;
        self.cursor.advance(msg.sequence)?;

        debug!(
            feed_id = %self.feed.feed_id,
            indexed = %msg.key,
            sequence = msg.sequence,
            position = position,
            "Wrote index record"
        );
        Ok(WriteOutcome::Written {
            sequence: msg.sequence,
            position,
        })
    }
}
