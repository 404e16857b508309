//! End-to-end test infrastructure for index-feeds.
//!
//! Provides a shared TestHarness over RocksDB storage and helpers that work
//! against any store, so scenarios can run on both the persistent and the
//! in-memory backend.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use feed_indexing::{FeedFormat, JsonFeedFormat};
use feed_scheduler::{IndexFeedScheduler, SchedulerConfig};
use feed_storage::{IndexFeedStore, SourceLog, Storage, SubfeedResolver};
use feed_types::{MsgKey, Query, SourceMsg};

/// Upper bound on any wait in these tests.
pub const WAIT: Duration = Duration::from_secs(10);

/// Shared test harness for E2E tests.
///
/// Owns a temp directory holding one RocksDB store, which can be closed and
/// reopened to simulate a process restart.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Path of the RocksDB directory
    pub db_path: PathBuf,
    /// Shared storage instance
    pub storage: Arc<Storage>,
}

impl TestHarness {
    /// Create a new test harness with temp directory and storage.
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("db");
        let storage = Arc::new(Storage::open(&db_path).expect("Failed to open test storage"));

        Self {
            _temp_dir: temp_dir,
            db_path,
            storage,
        }
    }

    /// Close and reopen the store.
    ///
    /// Every other handle to the storage (schedulers included) must have
    /// been dropped first.
    pub fn restart(self) -> Self {
        let Self {
            _temp_dir,
            db_path,
            storage,
        } = self;
        drop(storage);
        let storage = Arc::new(Storage::open(&db_path).expect("Failed to reopen test storage"));

        Self {
            _temp_dir,
            db_path,
            storage,
        }
    }

    /// Local identity of the store.
    pub fn local_id(&self) -> String {
        self.storage.local_id().to_string()
    }

    /// Create a scheduler over the harness storage.
    pub fn scheduler(&self, page_size: usize) -> IndexFeedScheduler {
        scheduler_over(self.storage.clone(), page_size)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a scheduler over any store.
pub fn scheduler_over<S>(store: Arc<S>, page_size: usize) -> IndexFeedScheduler
where
    S: SourceLog + IndexFeedStore + SubfeedResolver + 'static,
{
    IndexFeedScheduler::with_store(store, SchedulerConfig::default().with_page_size(page_size))
}

/// Public "post" entries of the local identity.
pub fn posts_query(local_id: &str) -> Query {
    Query::new(local_id, false).with_type("post")
}

/// Append one public entry per type, content numbered from `first`.
pub async fn append_entries(log: &dyn SourceLog, types: &[&str], first: usize) -> Vec<SourceMsg> {
    let mut msgs = Vec::with_capacity(types.len());
    for (i, msg_type) in types.iter().enumerate() {
        let msg = log
            .append(msg_type, false, json!({ "n": first + i }))
            .await
            .expect("Failed to append entry");
        msgs.push(msg);
    }
    msgs
}

/// Keys referenced by an index feed, in record order.
pub async fn indexed_keys(feeds: &dyn IndexFeedStore, feed_id: &str) -> Vec<MsgKey> {
    feeds
        .records(feed_id)
        .await
        .expect("Failed to read index feed")
        .iter()
        .map(|payload| {
            JsonFeedFormat
                .decode(payload)
                .expect("Failed to decode index record")
                .indexed
        })
        .collect()
}

/// Poll until the index feed holds at least `count` records.
pub async fn wait_for_records(feeds: &dyn IndexFeedStore, feed_id: &str, count: usize) {
    tokio::time::timeout(WAIT, async {
        loop {
            let records = feeds.records(feed_id).await.expect("Failed to read index feed");
            if records.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Index feed did not reach expected length");
}

/// Keys of `msgs`, in order.
pub fn keys(msgs: &[SourceMsg]) -> Vec<MsgKey> {
    msgs.iter().map(|msg| msg.key.clone()).collect()
}
