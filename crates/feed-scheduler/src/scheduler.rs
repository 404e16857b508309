//! Index feed scheduler.
//!
//! Lifecycle management for indexing tasks: at most one task per canonical
//! query, started on demand, stopped individually or all at once, with a
//! graceful shutdown that waits for tasks to exit.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use ulid::Ulid;

use feed_indexing::{FeedFormat, JsonFeedFormat};
use feed_storage::{IndexFeedStore, SourceLog, SubfeedResolver};
use feed_types::{
    canonicalize, FeedMetadata, IndexFeedInfo, Query, QueryId, QueryInput, INDEX_PURPOSE,
};

use crate::completion::CompletionSignal;
use crate::registry::{TaskHandle, TaskRegistry, TaskStatus};
use crate::task::{IndexingTask, TaskContext};
use crate::{SchedulerConfig, SchedulerError};

/// Result of [`IndexFeedScheduler::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// A new task was spawned and resolved its cursor
    Started {
        /// Source sequence the task resumes after
        cursor: u64,
    },
    /// A task for the query was already running; nothing was spawned
    AlreadyRunning,
    /// The new task was stopped before it resolved its cursor
    Stopped,
}

/// Maintains one index feed per query over the local source log.
///
/// Dropping the scheduler cancels every task it started.
pub struct IndexFeedScheduler {
    log: Arc<dyn SourceLog>,
    feeds: Arc<dyn IndexFeedStore>,
    subfeeds: Arc<dyn SubfeedResolver>,
    format: Arc<dyn FeedFormat>,
    config: SchedulerConfig,
    registry: Arc<TaskRegistry>,
    completion: Arc<CompletionSignal>,
    shutdown_token: CancellationToken,
}

impl IndexFeedScheduler {
    /// Create a scheduler over the given collaborators.
    ///
    /// Index records are written in the `indexed-v1` format; see
    /// [`IndexFeedScheduler::with_format`] to replace it.
    pub fn new(
        log: Arc<dyn SourceLog>,
        feeds: Arc<dyn IndexFeedStore>,
        subfeeds: Arc<dyn SubfeedResolver>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            log,
            feeds,
            subfeeds,
            format: Arc::new(JsonFeedFormat),
            config,
            registry: Arc::new(TaskRegistry::new()),
            completion: Arc::new(CompletionSignal::new()),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Create a scheduler over a store that provides every collaborator.
    pub fn with_store<S>(store: Arc<S>, config: SchedulerConfig) -> Self
    where
        S: SourceLog + IndexFeedStore + SubfeedResolver + 'static,
    {
        Self::new(store.clone(), store.clone(), store, config)
    }

    /// Replace the index feed format.
    pub fn with_format(mut self, format: Arc<dyn FeedFormat>) -> Self {
        self.format = format;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Canonicalize `input` and check it targets the local identity.
    pub fn validate(
        &self,
        input: impl Into<QueryInput>,
    ) -> Result<(Query, QueryId), SchedulerError> {
        let (query, query_id) = canonicalize(input)?;
        query.ensure_author(self.log.local_id())?;
        Ok((query, query_id))
    }

    /// Start maintaining the index feed for `input`.
    ///
    /// Finds or creates the query's index feed and ensures exactly one task
    /// is indexing into it. Starting a query that is already running is
    /// not an error. Returns once the task has resolved its cursor.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidQuery` for a malformed query or one whose
    ///   author is not the local identity
    /// - `SchedulerError::Subfeed` if the index feed cannot be found or created
    /// - `SchedulerError::Indexing` if the feed's cursor cannot be resolved
    /// - `SchedulerError::ShutDown` after [`IndexFeedScheduler::shutdown`]
    pub async fn start(
        &self,
        input: impl Into<QueryInput>,
    ) -> Result<IndexFeedInfo, SchedulerError> {
        if self.shutdown_token.is_cancelled() {
            return Err(SchedulerError::ShutDown);
        }
        let (query, query_id) = self.validate(input)?;

        let metadata = FeedMetadata::for_query(&query_id);
        let feed = self
            .subfeeds
            .find_or_create(INDEX_PURPOSE, self.format.name(), &metadata)
            .await?;
        info!(query_id = %query_id, feed_id = %feed.feed_id, "Index feed ready");

        self.schedule(query, &feed).await?;
        Ok(feed)
    }

    /// Spawn an indexing task for `query` into `feed`, unless one runs.
    ///
    /// The registry slot is claimed before the task is spawned, so
    /// concurrent calls for one query spawn a single task.
    pub async fn schedule(
        &self,
        query: Query,
        feed: &IndexFeedInfo,
    ) -> Result<ScheduleOutcome, SchedulerError> {
        if self.shutdown_token.is_cancelled() {
            return Err(SchedulerError::ShutDown);
        }

        let query_id = query.id();
        let task_id = Ulid::new();
        let (ready_tx, ready_rx) = oneshot::channel();

        let registered = self.registry.register_if_absent(&query_id, || {
            let cancel = self.shutdown_token.child_token();
            let status = TaskStatus::new(query_id.clone(), task_id, feed.feed_id.clone());
            let task = IndexingTask {
                ctx: self.task_context(),
                task_id,
                query,
                feed: feed.clone(),
                cancel: cancel.clone(),
            };
            let join = tokio::spawn(task.run(ready_tx));
            TaskHandle::new(task_id, cancel, join, status)
        });

        if !registered {
            warn!(query_id = %query_id, "Redundant start, task already running");
            return Ok(ScheduleOutcome::AlreadyRunning);
        }

        match ready_rx.await {
            Ok(Ok(cursor)) => Ok(ScheduleOutcome::Started { cursor }),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(ScheduleOutcome::Stopped),
        }
    }

    fn task_context(&self) -> TaskContext {
        TaskContext {
            log: self.log.clone(),
            feeds: self.feeds.clone(),
            format: self.format.clone(),
            registry: self.registry.clone(),
            completion: self.completion.clone(),
            page_size: self.config.page_size,
        }
    }

    /// Wait until the index feed for `input` reflects every entry that
    /// existed when its task caught up.
    ///
    /// Returns immediately if that already happened, even if the task has
    /// since been stopped. Calling before `start` is allowed; the wait then
    /// lasts until a task for the query drains its backlog, which may be
    /// never.
    pub async fn done_old(&self, input: impl Into<QueryInput>) -> Result<(), SchedulerError> {
        let (_, query_id) = self.validate(input)?;
        self.completion.wait_drained(&query_id).await;
        Ok(())
    }

    /// Like [`IndexFeedScheduler::done_old`], but gives up if the query's
    /// task exits first.
    ///
    /// A task that fails or is stopped before draining its backlog will
    /// never fire the drained signal; this returns
    /// `SchedulerError::TaskExited` in that case instead of waiting for a
    /// later `start`. Also fails at once when no task is running and the
    /// backlog has not drained.
    pub async fn wait_backlog(&self, input: impl Into<QueryInput>) -> Result<(), SchedulerError> {
        let (_, query_id) = self.validate(input)?;
        tokio::select! {
            biased;
            _ = self.completion.wait_drained(&query_id) => Ok(()),
            _ = self.registry.wait_exit(&query_id) => {
                // The task may have drained right before leaving.
                if self.completion.is_drained(&query_id) {
                    Ok(())
                } else {
                    Err(SchedulerError::TaskExited(query_id.to_string()))
                }
            }
        }
    }

    /// Callback form of [`IndexFeedScheduler::done_old`].
    ///
    /// `callback` runs on the indexing task right after the last backlog
    /// record is written, before any live entry is processed.
    pub fn on_done_old<F>(
        &self,
        input: impl Into<QueryInput>,
        callback: F,
    ) -> Result<(), SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let (_, query_id) = self.validate(input)?;
        self.completion.on_backlog_drained(&query_id, callback);
        Ok(())
    }

    /// Stop the task for `input`.
    ///
    /// Returns immediately; the task exits at its next suspension point and
    /// writes nothing further. Stopping a query with no running task is a
    /// no-op. Returns whether a task was stopped.
    pub fn stop(&self, input: impl Into<QueryInput>) -> bool {
        let query_id = match self.validate(input) {
            Ok((_, query_id)) => query_id,
            Err(e) => {
                warn!(error = %e, "Ignoring stop for invalid query");
                return false;
            }
        };

        match self.registry.stop(&query_id) {
            Some(handle) => {
                info!(
                    query_id = %query_id,
                    feed_id = %handle.status().feed_id,
                    "Stopped indexing task"
                );
                true
            }
            None => {
                warn!(query_id = %query_id, "Redundant stop, no task running");
                false
            }
        }
    }

    /// Stop every task. Returns the number of tasks stopped.
    pub fn stop_all(&self) -> usize {
        let count = self.registry.stop_all().len();
        info!(count = count, "Stopped all indexing tasks");
        count
    }

    /// Shutdown the scheduler gracefully.
    ///
    /// Stops every task, refuses further starts, and waits up to the
    /// configured timeout for the tasks to exit.
    pub async fn shutdown(&self) {
        info!("Initiating scheduler shutdown");
        self.shutdown_token.cancel();

        let handles = self.registry.stop_all();
        let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);
        let deadline = tokio::time::Instant::now() + timeout;
        let mut abandoned = 0;
        for handle in handles {
            if tokio::time::timeout_at(deadline, handle.join()).await.is_err() {
                abandoned += 1;
            }
        }

        if abandoned > 0 {
            warn!(abandoned = abandoned, "Tasks still running after shutdown timeout");
        }
        info!("Scheduler shutdown complete");
    }

    /// Start every configured autostart query for the local identity.
    ///
    /// Failures are logged and skipped. Returns the feeds that started.
    pub async fn autostart(&self) -> Vec<IndexFeedInfo> {
        let mut started = Vec::new();
        for partial in &self.config.autostart {
            let query = partial.with_author(self.log.local_id());
            match self.start(query.clone()).await {
                Ok(feed) => started.push(feed),
                Err(e) => warn!(
                    query_id = %query.id(),
                    error = %e,
                    "Autostart query failed"
                ),
            }
        }
        info!(count = started.len(), "Autostart complete");
        started
    }

    /// Get the status of the task for `input`, if one is running.
    pub fn status(
        &self,
        input: impl Into<QueryInput>,
    ) -> Result<Option<TaskStatus>, SchedulerError> {
        let (_, query_id) = canonicalize(input)?;
        Ok(self.registry.get_status(&query_id))
    }

    /// Get the status of every running task.
    pub fn all_status(&self) -> Vec<TaskStatus> {
        self.registry.get_all_status()
    }

    /// Whether the backlog of `input` has been drained.
    pub fn is_drained(&self, input: impl Into<QueryInput>) -> Result<bool, SchedulerError> {
        let (_, query_id) = canonicalize(input)?;
        Ok(self.completion.is_drained(&query_id))
    }

    /// Get the number of running tasks.
    pub fn task_count(&self) -> usize {
        self.registry.task_count()
    }
}

impl Drop for IndexFeedScheduler {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use feed_indexing::IndexingError;
    use feed_storage::{MemoryStore, StorageError};
    use feed_types::{MsgKey, PartialQuery};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ME: &str = "@me.ed25519";
    const WAIT: Duration = Duration::from_secs(5);

    fn posts() -> Query {
        Query::new(ME, false).with_type("post")
    }

    async fn store_with(types: &[&str]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::with_identity(ME));
        for t in types {
            store.append(t, false, json!({ "text": t })).await.unwrap();
        }
        store
    }

    fn scheduler(store: &Arc<MemoryStore>) -> IndexFeedScheduler {
        IndexFeedScheduler::with_store(store.clone(), SchedulerConfig::default().with_page_size(2))
    }

    /// Keys the index feed points at, in record order.
    async fn indexed(store: &MemoryStore, feed: &IndexFeedInfo) -> Vec<MsgKey> {
        store
            .records(&feed.feed_id)
            .await
            .unwrap()
            .iter()
            .map(|p| JsonFeedFormat.decode(p).unwrap().indexed)
            .collect()
    }

    async fn wait_until<F: Fn() -> bool>(cond: F) {
        tokio::time::timeout(WAIT, async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_start_indexes_backlog() {
        let store = store_with(&["post", "vote", "post", "post", "vote"]).await;
        let sched = scheduler(&store);

        let feed = sched.start(posts()).await.unwrap();
        tokio::time::timeout(WAIT, sched.done_old(posts()))
            .await
            .expect("backlog should drain")
            .unwrap();

        let expected: Vec<MsgKey> = store
            .read_after(&posts(), 0, 100)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.key)
            .collect();
        assert_eq!(expected.len(), 3);
        assert_eq!(indexed(&store, &feed).await, expected);
        assert!(sched.is_drained(posts()).unwrap());

        let status = sched.status(posts()).unwrap().unwrap();
        assert_eq!(status.phase, crate::TaskPhase::Live);
        assert_eq!(status.cursor, 4);
        assert_eq!(status.indexed_count, 3);
    }

    #[tokio::test]
    async fn test_start_from_text_query() {
        let store = store_with(&["post"]).await;
        let sched = scheduler(&store);
        let text = format!(r#"{{"type":"post","author":"{ME}","private":false}}"#);

        let from_text = sched.start(text.as_str()).await.unwrap();
        let from_struct = sched.start(posts()).await.unwrap();
        assert_eq!(from_text, from_struct);
        assert_eq!(sched.task_count(), 1);
    }

    #[tokio::test]
    async fn test_second_start_is_noop() {
        let store = store_with(&["post", "post"]).await;
        let sched = scheduler(&store);

        let first = sched.start(posts()).await.unwrap();
        sched.done_old(posts()).await.unwrap();
        let outcome = sched.schedule(posts(), &first).await.unwrap();
        assert_eq!(outcome, ScheduleOutcome::AlreadyRunning);

        let second = sched.start(posts()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(sched.task_count(), 1);
        assert_eq!(indexed(&store, &first).await.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_starts_spawn_one_task() {
        let store = store_with(&["post"; 10]).await;
        let sched = scheduler(&store);

        let results = futures::future::join_all((0..8).map(|_| sched.start(posts()))).await;
        let feeds: Vec<IndexFeedInfo> = results.into_iter().map(Result::unwrap).collect();
        assert!(feeds.iter().all(|f| f == &feeds[0]));
        assert_eq!(sched.task_count(), 1);

        sched.done_old(posts()).await.unwrap();
        assert_eq!(indexed(&store, &feeds[0]).await.len(), 10);
    }

    #[tokio::test]
    async fn test_foreign_author_is_rejected() {
        let store = store_with(&[]).await;
        let sched = scheduler(&store);
        let foreign = Query::new("@someone-else.ed25519", false);

        let err = sched.start(foreign.clone()).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidQuery(_)));
        assert!(matches!(
            sched.done_old(foreign).await,
            Err(SchedulerError::InvalidQuery(_))
        ));
        assert_eq!(sched.task_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_query_is_rejected() {
        let store = store_with(&[]).await;
        let sched = scheduler(&store);
        let err = sched.start(r#"{"author": 42}"#).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidQuery(_)));
        assert!(!sched.stop("not json"));
    }

    #[tokio::test]
    async fn test_done_old_before_start() {
        let store = store_with(&["post", "post", "post"]).await;
        let sched = Arc::new(scheduler(&store));

        let waiter = {
            let sched = sched.clone();
            tokio::spawn(async move { sched.done_old(posts()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        let feed = sched.start(posts()).await.unwrap();
        tokio::time::timeout(WAIT, waiter)
            .await
            .expect("waiter should fire after drain")
            .unwrap()
            .unwrap();
        assert_eq!(indexed(&store, &feed).await.len(), 3);
    }

    #[tokio::test]
    async fn test_done_old_fires_before_live_entries() {
        let store = store_with(&["post"; 5]).await;
        let sched = scheduler(&store);

        let seen = Arc::new(AtomicUsize::new(usize::MAX));
        let feed_id = Arc::new(std::sync::Mutex::new(None::<String>));
        {
            let (seen, store, feed_id) = (seen.clone(), store.clone(), feed_id.clone());
            sched
                .on_done_old(posts(), move || {
                    let id = feed_id.lock().unwrap().clone().unwrap_or_default();
                    seen.store(store.record_count(&id), Ordering::SeqCst);
                })
                .unwrap();
        }

        // Create the feed first so the callback knows where to look.
        let feed = store
            .find_or_create(INDEX_PURPOSE, "indexed-v1", &FeedMetadata::for_query(&posts().id()))
            .await
            .unwrap();
        *feed_id.lock().unwrap() = Some(feed.feed_id.clone());

        sched.start(posts()).await.unwrap();
        sched.done_old(posts()).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 5);

        store.append("post", false, json!(null)).await.unwrap();
        wait_until(|| store.record_count(&feed.feed_id) == 6).await;
    }

    #[tokio::test]
    async fn test_done_old_after_stop_still_fires() {
        let store = store_with(&["post"]).await;
        let sched = scheduler(&store);
        sched.start(posts()).await.unwrap();
        sched.done_old(posts()).await.unwrap();
        assert!(sched.stop(posts()));

        tokio::time::timeout(WAIT, sched.done_old(posts()))
            .await
            .expect("drained state is sticky")
            .unwrap();
    }

    #[tokio::test]
    async fn test_live_entries_are_indexed() {
        let store = store_with(&["post"]).await;
        let sched = scheduler(&store);
        let feed = sched.start(posts()).await.unwrap();
        sched.done_old(posts()).await.unwrap();

        store.append("vote", false, json!(null)).await.unwrap();
        let live = store.append("post", false, json!(null)).await.unwrap();
        wait_until(|| store.record_count(&feed.feed_id) == 2).await;

        assert_eq!(indexed(&store, &feed).await.last(), Some(&live.key));
    }

    #[tokio::test]
    async fn test_stop_halts_writes_and_restart_resumes() {
        let store = store_with(&["post", "post"]).await;
        let sched = scheduler(&store);
        let feed = sched.start(posts()).await.unwrap();
        sched.done_old(posts()).await.unwrap();

        assert!(sched.stop(posts()));
        assert!(!sched.stop(posts()));
        assert_eq!(sched.task_count(), 0);

        store.append("post", false, json!(null)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.record_count(&feed.feed_id), 2);

        let restarted = sched.start(posts()).await.unwrap();
        assert_eq!(restarted, feed);
        wait_until(|| store.record_count(&feed.feed_id) == 3).await;

        let keys = indexed(&store, &feed).await;
        let mut unique = keys.clone();
        unique.dedup();
        assert_eq!(keys, unique);
    }

    #[tokio::test]
    async fn test_stop_all() {
        let store = store_with(&["post", "vote"]).await;
        let sched = scheduler(&store);
        sched.start(posts()).await.unwrap();
        sched.start(Query::new(ME, false).with_type("vote")).await.unwrap();
        assert_eq!(sched.all_status().len(), 2);

        assert_eq!(sched.stop_all(), 2);
        assert_eq!(sched.task_count(), 0);
        assert_eq!(sched.stop_all(), 0);
    }

    #[tokio::test]
    async fn test_dangling_cursor_fails_start() {
        let store = store_with(&["post"]).await;
        let sched = scheduler(&store);
        let feed = store
            .find_or_create(INDEX_PURPOSE, "indexed-v1", &FeedMetadata::for_query(&posts().id()))
            .await
            .unwrap();
        let payload = JsonFeedFormat
            .encode(&feed_types::IndexRecord::pointer(MsgKey::generate()), &feed.keys)
            .unwrap();
        store.append_record(&feed.feed_id, payload).await.unwrap();

        let err = sched.start(posts()).await.unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Indexing(IndexingError::DanglingCursor { .. })
        ));
        assert_eq!(sched.task_count(), 0);
        assert_eq!(store.record_count(&feed.feed_id), 1);
    }

    /// Index feed store whose appends always fail.
    struct ReadOnlyFeeds(Arc<MemoryStore>);

    #[async_trait]
    impl IndexFeedStore for ReadOnlyFeeds {
        async fn append_record(
            &self,
            _feed_id: &str,
            _payload: Vec<u8>,
        ) -> Result<u64, StorageError> {
            Err(StorageError::Key("read-only".to_string()))
        }

        async fn latest_record(&self, feed_id: &str) -> Result<Option<Vec<u8>>, StorageError> {
            self.0.latest_record(feed_id).await
        }

        async fn records(&self, feed_id: &str) -> Result<Vec<Vec<u8>>, StorageError> {
            self.0.records(feed_id).await
        }
    }

    #[tokio::test]
    async fn test_write_failure_stops_task() {
        let store = store_with(&["post"]).await;
        let sched = IndexFeedScheduler::new(
            store.clone(),
            Arc::new(ReadOnlyFeeds(store.clone())),
            store.clone(),
            SchedulerConfig::default(),
        );

        sched.start(posts()).await.unwrap();
        wait_until(|| sched.task_count() == 0).await;
        assert!(!sched.is_drained(posts()).unwrap());

        // The slot is free again.
        sched.start(posts()).await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_backlog_fails_when_task_dies() {
        let store = store_with(&["post", "post"]).await;
        let sched = IndexFeedScheduler::new(
            store.clone(),
            Arc::new(ReadOnlyFeeds(store.clone())),
            store.clone(),
            SchedulerConfig::default(),
        );

        sched.start(posts()).await.unwrap();
        let result = tokio::time::timeout(WAIT, sched.wait_backlog(posts()))
            .await
            .expect("a dead task must not leave the waiter hanging");
        assert!(matches!(result, Err(SchedulerError::TaskExited(_))));
        assert_eq!(sched.task_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_backlog() {
        let store = store_with(&["post", "vote", "post"]).await;
        let sched = scheduler(&store);

        // No task and nothing drained yet.
        assert!(matches!(
            sched.wait_backlog(posts()).await,
            Err(SchedulerError::TaskExited(_))
        ));

        let feed = sched.start(posts()).await.unwrap();
        tokio::time::timeout(WAIT, sched.wait_backlog(posts()))
            .await
            .expect("backlog should drain")
            .unwrap();
        assert_eq!(indexed(&store, &feed).await.len(), 2);

        // Drained state outlives the task.
        assert!(sched.stop(posts()));
        sched.wait_backlog(posts()).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_rejects_foreign_author() {
        let store = store_with(&["post"]).await;
        let sched = scheduler(&store);
        sched.start(posts()).await.unwrap();

        let foreign = Query::new("@someone-else.ed25519", false).with_type("post");
        assert!(!sched.stop(foreign));
        assert_eq!(sched.task_count(), 1);
        assert!(sched.stop(posts()));
    }

    #[tokio::test]
    async fn test_gates_are_released_after_tasks_exit() {
        let store = store_with(&["post", "vote"]).await;
        let sched = scheduler(&store);
        let votes = Query::new(ME, false).with_type("vote");

        for _ in 0..3 {
            sched.start(posts()).await.unwrap();
            sched.start(votes.clone()).await.unwrap();
            sched.done_old(posts()).await.unwrap();
            sched.stop(posts());
            sched.stop(votes.clone());
        }
        sched.start(posts()).await.unwrap();
        assert!(sched.registry.gate_count() >= 1);

        sched.shutdown().await;
        wait_until(|| sched.registry.gate_count() == 0).await;
    }

    #[tokio::test]
    async fn test_autostart() {
        let store = store_with(&["post", "vote", "post"]).await;
        let config = SchedulerConfig::default()
            .with_autostart(PartialQuery {
                msg_type: Some("post".to_string()),
                private: false,
            })
            .with_autostart(PartialQuery {
                msg_type: None,
                private: false,
            });
        let sched = IndexFeedScheduler::with_store(store.clone(), config);

        let feeds = sched.autostart().await;
        assert_eq!(feeds.len(), 2);
        assert_eq!(sched.task_count(), 2);

        sched.done_old(posts()).await.unwrap();
        sched.done_old(Query::new(ME, false)).await.unwrap();
        assert_eq!(indexed(&store, &feeds[0]).await.len(), 2);
        assert_eq!(indexed(&store, &feeds[1]).await.len(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_starts() {
        let store = store_with(&["post"]).await;
        let sched = scheduler(&store);
        sched.start(posts()).await.unwrap();

        tokio::time::timeout(WAIT, sched.shutdown())
            .await
            .expect("shutdown should finish");
        assert_eq!(sched.task_count(), 0);
        assert!(matches!(
            sched.start(posts()).await,
            Err(SchedulerError::ShutDown)
        ));
    }
}
