//! Collaborator interfaces consumed by the indexing engine.
//!
//! The engine never talks to a concrete store: it reads the source log
//! through [`SourceLog`], appends index records through [`IndexFeedStore`]
//! and obtains index feeds through [`SubfeedResolver`].

use async_trait::async_trait;
use tokio::sync::watch;
use ulid::Ulid;

use feed_types::{FeedKeys, FeedMetadata, IndexFeedInfo, MsgKey, Query, SourceMsg};

use crate::error::StorageError;

/// The local identity's append-only log, with a filtered read and a live
/// head subscription.
#[async_trait]
pub trait SourceLog: Send + Sync {
    /// Feed ID of the identity that owns this log.
    fn local_id(&self) -> &str;

    /// Sequence number of the newest entry (0 when empty).
    fn head(&self) -> u64;

    /// Subscribe to head changes.
    ///
    /// The receiver observes the sequence number of the newest entry and is
    /// notified after every append.
    fn subscribe(&self) -> watch::Receiver<u64>;

    /// Append an entry authored by the local identity.
    async fn append(
        &self,
        msg_type: &str,
        private: bool,
        content: serde_json::Value,
    ) -> Result<SourceMsg, StorageError>;

    /// Look up an entry by key.
    async fn get(&self, key: &MsgKey) -> Result<Option<SourceMsg>, StorageError>;

    /// Up to `limit` entries matching `query` with sequence > `after`,
    /// in increasing sequence order.
    async fn read_after(
        &self,
        query: &Query,
        after: u64,
        limit: usize,
    ) -> Result<Vec<SourceMsg>, StorageError>;
}

/// Storage for the encoded records of index feeds.
#[async_trait]
pub trait IndexFeedStore: Send + Sync {
    /// Append an encoded record; returns its position (starting at 1).
    async fn append_record(&self, feed_id: &str, payload: Vec<u8>) -> Result<u64, StorageError>;

    /// The most recently appended record of `feed_id`, if any.
    async fn latest_record(&self, feed_id: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Every record of `feed_id` in append order.
    async fn records(&self, feed_id: &str) -> Result<Vec<Vec<u8>>, StorageError>;
}

/// Find-or-create for derived feeds.
#[async_trait]
pub trait SubfeedResolver: Send + Sync {
    /// Return the derived feed registered for `(purpose, feed_format,
    /// metadata)`, creating it on first use. Never creates a second feed for
    /// the same arguments.
    async fn find_or_create(
        &self,
        purpose: &str,
        feed_format: &str,
        metadata: &FeedMetadata,
    ) -> Result<IndexFeedInfo, StorageError>;
}

/// Mint a local identity feed ID.
pub fn mint_identity() -> String {
    format!("@{}.ed25519", Ulid::new())
}

/// Mint a fresh derived feed descriptor.
pub(crate) fn mint_subfeed(
    purpose: &str,
    feed_format: &str,
    metadata: &FeedMetadata,
) -> IndexFeedInfo {
    let public = Ulid::new().to_string();
    let feed_id = format!("ssb:feed/{}/{}", feed_format, public);
    IndexFeedInfo {
        purpose: purpose.to_string(),
        feed_id: feed_id.clone(),
        keys: FeedKeys {
            curve: "ed25519".to_string(),
            public,
            id: feed_id,
        },
        feed_format: feed_format.to_string(),
        metadata: metadata.clone(),
    }
}
