//! In-memory store implementing every collaborator interface.
//!
//! Used by tests and by embedders that keep the log elsewhere and only
//! need the engine.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use feed_types::{FeedMetadata, IndexFeedInfo, MsgKey, Query, SourceMsg};

use crate::error::StorageError;
use crate::keys::SubfeedKey;
use crate::log::{mint_identity, mint_subfeed, IndexFeedStore, SourceLog, SubfeedResolver};

#[derive(Default)]
struct MemoryState {
    /// Entry with sequence `n` lives at index `n - 1`
    log: Vec<SourceMsg>,
    by_key: HashMap<MsgKey, usize>,
    feeds: HashMap<String, Vec<Vec<u8>>>,
    subfeeds: HashMap<Vec<u8>, IndexFeedInfo>,
}

/// Process-local store for one identity.
pub struct MemoryStore {
    local_id: String,
    state: Mutex<MemoryState>,
    head_tx: watch::Sender<u64>,
}

impl MemoryStore {
    /// Create an empty store with a freshly minted identity.
    pub fn new() -> Self {
        Self::with_identity(mint_identity())
    }

    /// Create an empty store owned by `local_id`.
    pub fn with_identity(local_id: impl Into<String>) -> Self {
        let (head_tx, _) = watch::channel(0);
        Self {
            local_id: local_id.into(),
            state: Mutex::new(MemoryState::default()),
            head_tx,
        }
    }

    /// Number of entries in the source log.
    pub fn len(&self) -> usize {
        self.lock().log.len()
    }

    /// Whether the source log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of records in an index feed.
    pub fn record_count(&self, feed_id: &str) -> usize {
        self.lock().feeds.get(feed_id).map_or(0, Vec::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned lock only means another thread panicked mid-test;
        // the state itself is always left consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceLog for MemoryStore {
    fn local_id(&self) -> &str {
        &self.local_id
    }

    fn head(&self) -> u64 {
        *self.head_tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.head_tx.subscribe()
    }

    async fn append(
        &self,
        msg_type: &str,
        private: bool,
        content: serde_json::Value,
    ) -> Result<SourceMsg, StorageError> {
        let msg = {
            let mut state = self.lock();
            let idx = state.log.len();
            let msg = SourceMsg::new(&self.local_id, idx as u64 + 1, msg_type, private, content);
            state.by_key.insert(msg.key.clone(), idx);
            state.log.push(msg.clone());
            // Published under the lock so heads never go backwards.
            self.head_tx.send_replace(msg.sequence);
            msg
        };
        debug!(sequence = msg.sequence, key = %msg.key, "Appended source entry");
        Ok(msg)
    }

    async fn get(&self, key: &MsgKey) -> Result<Option<SourceMsg>, StorageError> {
        let state = self.lock();
        Ok(state.by_key.get(key).map(|&idx| state.log[idx].clone()))
    }

    async fn read_after(
        &self,
        query: &Query,
        after: u64,
        limit: usize,
    ) -> Result<Vec<SourceMsg>, StorageError> {
        let state = self.lock();
        let start = usize::try_from(after).unwrap_or(usize::MAX).min(state.log.len());
        Ok(state.log[start..]
            .iter()
            .filter(|msg| query.matches(msg))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl IndexFeedStore for MemoryStore {
    async fn append_record(&self, feed_id: &str, payload: Vec<u8>) -> Result<u64, StorageError> {
        let mut state = self.lock();
        let records = state.feeds.entry(feed_id.to_string()).or_default();
        records.push(payload);
        Ok(records.len() as u64)
    }

    async fn latest_record(&self, feed_id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self
            .lock()
            .feeds
            .get(feed_id)
            .and_then(|records| records.last().cloned()))
    }

    async fn records(&self, feed_id: &str) -> Result<Vec<Vec<u8>>, StorageError> {
        Ok(self.lock().feeds.get(feed_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl SubfeedResolver for MemoryStore {
    async fn find_or_create(
        &self,
        purpose: &str,
        feed_format: &str,
        metadata: &FeedMetadata,
    ) -> Result<IndexFeedInfo, StorageError> {
        let key = SubfeedKey::new(purpose, feed_format, &metadata.querylang, &metadata.query);
        let mut state = self.lock();
        let info = state
            .subfeeds
            .entry(key.to_bytes())
            .or_insert_with(|| {
                let info = mint_subfeed(purpose, feed_format, metadata);
                debug!(feed_id = %info.feed_id, query = %metadata.query, "Created subfeed");
                info
            })
            .clone();
        Ok(info)
    }
}
