//! RocksDB wrapper for index-feeds storage.
//!
//! Provides:
//! - Database open/close with column family setup
//! - The persisted local identity
//! - Atomic source appends (entry + key lookup in one write batch)
//! - Index feed records and the subfeed registry

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use tokio::sync::watch;
use tracing::{debug, info};

use feed_types::{FeedMetadata, IndexFeedInfo, MsgKey, Query, SourceMsg};

use crate::column_families::{
    build_cf_descriptors, ALL_CF_NAMES, CF_INDEX_FEEDS, CF_META, CF_SOURCE, CF_SOURCE_KEYS,
    CF_SUBFEEDS,
};
use crate::error::StorageError;
use crate::keys::{IndexRecordKey, SourceKey, SubfeedKey};
use crate::log::{mint_identity, mint_subfeed, IndexFeedStore, SourceLog, SubfeedResolver};

const META_LOCAL_ID: &[u8] = b"local_id";

/// Persistent store for one identity's source log and its index feeds.
pub struct Storage {
    db: DB,
    local_id: String,
    head_tx: watch::Sender<u64>,
    /// Serializes sequence allocation and find-or-create
    write_lock: Mutex<()>,
}

impl Storage {
    /// Open storage at the given path, creating if necessary.
    ///
    /// The local identity is read from the store, or minted and persisted on
    /// first open.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Self::open_with_identity(path, None)
    }

    /// Open storage, pinning the local identity.
    ///
    /// Fails if the store already belongs to a different identity.
    pub fn open_with_identity(path: &Path, identity: Option<&str>) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        // Universal compaction for append-only
        db_opts.set_compaction_style(rocksdb::DBCompactionStyle::Universal);
        db_opts.set_max_background_jobs(4);

        let db = DB::open_cf_descriptors(&db_opts, path, build_cf_descriptors())?;

        let local_id = Self::load_identity(&db, identity)?;
        let head = Self::load_head(&db)?;
        info!(local_id = %local_id, head = head, "Storage opened");

        let (head_tx, _) = watch::channel(head);
        Ok(Self {
            db,
            local_id,
            head_tx,
            write_lock: Mutex::new(()),
        })
    }

    fn load_identity(db: &DB, requested: Option<&str>) -> Result<String, StorageError> {
        let cf = db
            .cf_handle(CF_META)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(CF_META.to_string()))?;

        let stored = db
            .get_cf(&cf, META_LOCAL_ID)?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());

        match (stored, requested) {
            (Some(stored), Some(requested)) if stored != requested => {
                Err(StorageError::IdentityMismatch {
                    stored,
                    requested: requested.to_string(),
                })
            }
            (Some(stored), _) => Ok(stored),
            (None, requested) => {
                let id = requested.map(str::to_string).unwrap_or_else(mint_identity);
                db.put_cf(&cf, META_LOCAL_ID, id.as_bytes())?;
                info!(local_id = %id, "Persisted new local identity");
                Ok(id)
            }
        }
    }

    /// Load the highest source sequence number from storage
    fn load_head(db: &DB) -> Result<u64, StorageError> {
        let cf = db
            .cf_handle(CF_SOURCE)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(CF_SOURCE.to_string()))?;

        let mut iter = db.iterator_cf(&cf, IteratorMode::End);
        if let Some(result) = iter.next() {
            let (key, _) = result?;
            return Ok(SourceKey::from_bytes(&key)?.sequence);
        }
        Ok(0)
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn source_at(&self, sequence: u64) -> Result<Option<SourceMsg>, StorageError> {
        let cf = self.cf(CF_SOURCE)?;
        match self.db.get_cf(cf, SourceKey::new(sequence).to_bytes())? {
            Some(bytes) => Ok(Some(SourceMsg::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn last_position(&self, feed_id: &str) -> Result<Option<(u64, Vec<u8>)>, StorageError> {
        let cf = self.cf(CF_INDEX_FEEDS)?;
        let prefix = IndexRecordKey::prefix(feed_id);
        let end = IndexRecordKey::prefix_end(feed_id);

        let mut iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&end, Direction::Reverse));
        if let Some(item) = iter.next() {
            let (key, value) = item?;
            if key.starts_with(&prefix) {
                let record_key = IndexRecordKey::from_bytes(&key)?;
                return Ok(Some((record_key.position, value.to_vec())));
            }
        }
        Ok(None)
    }

    /// Flush all column families to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(&cf)?;
            }
        }
        Ok(())
    }

    /// Get database statistics.
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        Ok(StorageStats {
            source_count: self.count_cf_entries(self.cf(CF_SOURCE)?)?,
            index_record_count: self.count_cf_entries(self.cf(CF_INDEX_FEEDS)?)?,
            subfeed_count: self.count_cf_entries(self.cf(CF_SUBFEEDS)?)?,
            head: self.head(),
            disk_usage_bytes: self.get_disk_usage(),
        })
    }

    fn count_cf_entries(&self, cf: &rocksdb::ColumnFamily) -> Result<u64, StorageError> {
        let mut count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn get_disk_usage(&self) -> u64 {
        std::fs::read_dir(self.db.path())
            .map(|entries| {
                entries
                    .flatten()
                    .filter_map(|entry| entry.metadata().ok())
                    .map(|metadata| metadata.len())
                    .sum()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl SourceLog for Storage {
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
            let _guard = self.lock_writes();
            let sequence = self.head() + 1;
            let msg = SourceMsg::new(&self.local_id, sequence, msg_type, private, content);

            let mut batch = WriteBatch::default();
            batch.put_cf(
                self.cf(CF_SOURCE)?,
                SourceKey::new(sequence).to_bytes(),
                msg.to_bytes()?,
            );
            batch.put_cf(
                self.cf(CF_SOURCE_KEYS)?,
                msg.key.as_str().as_bytes(),
                sequence.to_be_bytes(),
            );
            self.db.write(batch)?;

            // Publish while still holding the lock so heads are sent in order.
            self.head_tx.send_replace(sequence);
            msg
        };
        debug!(sequence = msg.sequence, key = %msg.key, "Appended source entry");
        Ok(msg)
    }

    async fn get(&self, key: &MsgKey) -> Result<Option<SourceMsg>, StorageError> {
        let cf = self.cf(CF_SOURCE_KEYS)?;
        let Some(bytes) = self.db.get_cf(cf, key.as_str().as_bytes())? else {
            return Ok(None);
        };
        let raw: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| StorageError::Key(format!("Corrupt sequence for {}", key)))?;
        self.source_at(u64::from_be_bytes(raw))
    }

    async fn read_after(
        &self,
        query: &Query,
        after: u64,
        limit: usize,
    ) -> Result<Vec<SourceMsg>, StorageError> {
        let cf = self.cf(CF_SOURCE)?;
        let start = SourceKey::new(after.saturating_add(1)).to_bytes();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&start, Direction::Forward));

        let mut results = Vec::new();
        for item in iter {
            if results.len() >= limit {
                break;
            }
            let (_, value) = item?;
            let msg = SourceMsg::from_bytes(&value)?;
            if query.matches(&msg) {
                results.push(msg);
            }
        }
        Ok(results)
    }
}

#[async_trait]
impl IndexFeedStore for Storage {
    async fn append_record(&self, feed_id: &str, payload: Vec<u8>) -> Result<u64, StorageError> {
        let _guard = self.lock_writes();
        let position = self.last_position(feed_id)?.map_or(0, |(p, _)| p) + 1;
        self.db.put_cf(
            self.cf(CF_INDEX_FEEDS)?,
            IndexRecordKey::new(feed_id, position).to_bytes(),
            payload,
        )?;
        Ok(position)
    }

    async fn latest_record(&self, feed_id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.last_position(feed_id)?.map(|(_, value)| value))
    }

    async fn records(&self, feed_id: &str) -> Result<Vec<Vec<u8>>, StorageError> {
        let cf = self.cf(CF_INDEX_FEEDS)?;
        let prefix = IndexRecordKey::prefix(feed_id);
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut results = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            results.push(value.to_vec());
        }
        Ok(results)
    }
}

#[async_trait]
impl SubfeedResolver for Storage {
    async fn find_or_create(
        &self,
        purpose: &str,
        feed_format: &str,
        metadata: &FeedMetadata,
    ) -> Result<IndexFeedInfo, StorageError> {
        let key = SubfeedKey::new(purpose, feed_format, &metadata.querylang, &metadata.query);
        let cf = self.cf(CF_SUBFEEDS)?;

        let _guard = self.lock_writes();
        if let Some(bytes) = self.db.get_cf(cf, key.to_bytes())? {
            return Ok(serde_json::from_slice(&bytes)?);
        }

        let info = mint_subfeed(purpose, feed_format, metadata);
        self.db
            .put_cf(cf, key.to_bytes(), serde_json::to_vec(&info)?)?;
        info!(feed_id = %info.feed_id, query = %metadata.query, "Created subfeed");
        Ok(info)
    }
}

/// Statistics about the storage.
#[derive(Debug, Default)]
pub struct StorageStats {
    /// Number of source log entries
    pub source_count: u64,
    /// Number of records across all index feeds
    pub index_record_count: u64,
    /// Number of derived feeds
    pub subfeed_count: u64,
    /// Sequence number of the newest source entry
    pub head: u64,
    /// Total disk usage in bytes
    pub disk_usage_bytes: u64,
}
