//! Body of one indexing task.
//!
//! A task waits for its query's gate, resolves its cursor, reports the
//! result back to whoever scheduled it, then pulls merged items and writes
//! them until cancelled or failed. However it exits, it removes its own
//! registry entry and gives its gate back.

use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use ulid::Ulid;

use feed_indexing::{
    CursorResolver, FeedFormat, IndexWriter, IndexingError, MergedStream, WriteOutcome,
};
use feed_storage::{IndexFeedStore, SourceLog};
use feed_types::{IndexFeedInfo, Query, QueryId};

use crate::completion::CompletionSignal;
use crate::registry::{TaskPhase, TaskRegistry};

/// Receives the resolved cursor, or the error that prevented the start.
pub(crate) type ReadySender = oneshot::Sender<Result<u64, IndexingError>>;

/// Shared collaborators handed to every task.
#[derive(Clone)]
pub(crate) struct TaskContext {
    pub log: Arc<dyn SourceLog>,
    pub feeds: Arc<dyn IndexFeedStore>,
    pub format: Arc<dyn FeedFormat>,
    pub registry: Arc<TaskRegistry>,
    pub completion: Arc<CompletionSignal>,
    pub page_size: usize,
}

/// One task incarnation.
pub(crate) struct IndexingTask {
    pub ctx: TaskContext,
    pub task_id: Ulid,
    pub query: Query,
    pub feed: IndexFeedInfo,
    pub cancel: CancellationToken,
}

impl IndexingTask {
    pub async fn run(self, ready: ReadySender) {
        let query_id = self.query.id();
        let registry = self.ctx.registry.clone();
        let gate = registry.gate(&query_id);
        self.run_gated(&query_id, gate.clone(), ready).await;
        registry.release_gate(&query_id, gate);
    }

    async fn run_gated(self, query_id: &QueryId, gate: Arc<Mutex<()>>, ready: ReadySender) {
        let resolver = CursorResolver::new(
            self.ctx.log.clone(),
            self.ctx.feeds.clone(),
            self.ctx.format.clone(),
        );

        // Held until this task exits: a previous incarnation still finishing
        // its last append must be done before the cursor is read.
        let (_gate_guard, resolved) = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(query_id = %query_id, "Task stopped before cursor was resolved");
                self.ctx.registry.remove_if(query_id, self.task_id);
                return;
            }
            resolved = async {
                let guard = gate.lock_owned().await;
                (guard, resolver.resolve(&self.feed).await)
            } => resolved,
        };

        let cursor = match resolved {
            Ok(cursor) => cursor,
            Err(e) => {
                error!(
                    query_id = %query_id,
                    feed_id = %self.feed.feed_id,
                    error = %e,
                    "Failed to resolve cursor"
                );
                // Free the slot first so a retry after the error can start.
                self.ctx.registry.remove_if(query_id, self.task_id);
                let _ = ready.send(Err(e));
                return;
            }
        };

        self.ctx.registry.update(query_id, self.task_id, |status| {
            status.phase = TaskPhase::Backfilling;
            status.cursor = cursor;
        });
        let _ = ready.send(Ok(cursor));

        info!(
            query_id = %query_id,
            feed_id = %self.feed.feed_id,
            cursor = cursor,
            "Indexing task started"
        );

        match self.index(query_id, cursor).await {
            Ok(written) => info!(
                query_id = %query_id,
                feed_id = %self.feed.feed_id,
                written = written,
                "Indexing task stopped"
            ),
            Err(e) => error!(
                query_id = %query_id,
                feed_id = %self.feed.feed_id,
                error = %e,
                "Indexing task failed"
            ),
        }
        self.ctx.registry.remove_if(query_id, self.task_id);
    }

    /// Pull and write until cancelled. Returns the number of records written.
    async fn index(&self, query_id: &QueryId, cursor: u64) -> Result<u64, IndexingError> {
        let mut stream = MergedStream::new(
            self.ctx.log.clone(),
            self.query.clone(),
            cursor,
            self.ctx.page_size,
        );
        let mut writer = IndexWriter::new(
            self.ctx.feeds.clone(),
            self.ctx.format.clone(),
            self.feed.clone(),
            cursor,
        );

        while let Some(item) = stream.next(&self.cancel).await? {
            match writer.write_if_entry(item, &self.cancel).await? {
                WriteOutcome::Written { sequence, .. } => {
                    let written_at = writer.cursor().last_written_at;
                    self.ctx.registry.update(query_id, self.task_id, |status| {
                        status.cursor = sequence;
                        status.indexed_count += 1;
                        status.last_indexed_at = written_at;
                    });
                }
                WriteOutcome::Drained => {
                    self.ctx.registry.update(query_id, self.task_id, |status| {
                        status.phase = TaskPhase::Live;
                    });
                    self.ctx.completion.mark_drained(query_id);
                }
                WriteOutcome::Cancelled => break,
            }
        }
        Ok(writer.cursor().written)
    }
}
