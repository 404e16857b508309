//! Two-phase merge of the source backlog and its live tail.
//!
//! [`MergedStream`] yields, in order:
//! 1. every matching entry after the cursor, read page by page
//! 2. exactly one [`MergedItem::SyncPoint`] once the backlog is exhausted
//! 3. every matching entry appended afterwards, indefinitely
//!
//! The stream is pull-based: a page is read only after the previous one has
//! been consumed, so a slow consumer stalls production instead of growing a
//! buffer. The live phase re-reads the log from the last delivered sequence
//! whenever the head moves, so an append racing the phase switch is neither
//! lost nor delivered twice.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use feed_storage::SourceLog;
use feed_types::{Query, SourceMsg};

use crate::error::IndexingError;

/// Default number of entries per backlog page.
pub const DEFAULT_PAGE_SIZE: usize = 75;

/// One item of the merged sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum MergedItem {
    /// A matching source entry
    Entry(SourceMsg),
    /// Marker between the backlog and the live tail
    SyncPoint,
}

/// Which segment the stream is producing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Reading entries that existed before the stream caught up
    Backfilling,
    /// Following new appends
    Live,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Backfilling => write!(f, "backfilling"),
            Phase::Live => write!(f, "live"),
        }
    }
}

/// Ordered stream of entries matching one query.
pub struct MergedStream {
    log: Arc<dyn SourceLog>,
    query: Query,
    page_size: usize,
    phase: Phase,
    /// Sequence of the last entry delivered or known not to match
    after: u64,
    buffer: VecDeque<SourceMsg>,
    backlog_exhausted: bool,
    head_rx: Option<watch::Receiver<u64>>,
}

impl MergedStream {
    /// Start merging entries of `query` with sequence greater than `cursor`.
    pub fn new(log: Arc<dyn SourceLog>, query: Query, cursor: u64, page_size: usize) -> Self {
        Self {
            log,
            query,
            page_size: page_size.max(1),
            phase: Phase::Backfilling,
            after: cursor,
            buffer: VecDeque::new(),
            backlog_exhausted: false,
            head_rx: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Sequence number the stream has advanced past.
    pub fn position(&self) -> u64 {
        self.after
    }

    /// Pull the next item.
    ///
    /// Returns `Ok(None)` once `cancel` fires; cancellation is checked before
    /// every read and while waiting for live entries.
    pub async fn next(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<MergedItem>, IndexingError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            if let Some(msg) = self.buffer.pop_front() {
                self.after = msg.sequence;
                return Ok(Some(MergedItem::Entry(msg)));
            }

            match self.phase {
                Phase::Backfilling => {
                    if self.backlog_exhausted {
                        self.phase = Phase::Live;
                        info!(
                            query_id = %self.query.id(),
                            position = self.after,
                            "Backlog drained, switching to live"
                        );
                        return Ok(Some(MergedItem::SyncPoint));
                    }

                    let Some(page) = self.read_page(cancel).await? else {
                        return Ok(None);
                    };
                    debug!(
                        query_id = %self.query.id(),
                        after = self.after,
                        count = page.len(),
                        "Read backlog page"
                    );
                    if page.len() < self.page_size {
                        self.backlog_exhausted = true;
                    }
                    self.buffer.extend(page);
                }
                Phase::Live => {
                    let head = {
                        let log = &self.log;
                        let rx = self.head_rx.get_or_insert_with(|| log.subscribe());
                        *rx.borrow_and_update()
                    };

                    let Some(page) = self.read_page(cancel).await? else {
                        return Ok(None);
                    };

                    if page.is_empty() {
                        // Nothing up to `head` matches; skip it on the next read.
                        self.after = self.after.max(head);
                        if !self.wait_for_append(cancel).await? {
                            return Ok(None);
                        }
                    } else {
                        self.buffer.extend(page);
                    }
                }
            }
        }
    }

    async fn read_page(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<SourceMsg>>, IndexingError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(None),
            page = self.log.read_after(&self.query, self.after, self.page_size) => Ok(Some(page?)),
        }
    }

    /// Wait until the head moves. Returns false if cancelled.
    async fn wait_for_append(&mut self, cancel: &CancellationToken) -> Result<bool, IndexingError> {
        let Some(rx) = self.head_rx.as_mut() else {
            return Ok(true);
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(false),
            changed = rx.changed() => {
                changed.map_err(|_| IndexingError::LiveClosed)?;
                Ok(true)
            }
        }
    }
}
