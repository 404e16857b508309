//! Index feed descriptors and records.

use serde::{Deserialize, Serialize};

use crate::message::MsgKey;
use crate::query::QueryId;

/// Purpose string under which index feeds are derived.
pub const INDEX_PURPOSE: &str = "index";

/// Query language recorded in index feed metadata.
pub const QUERY_LANG: &str = "ssb-ql-1";

/// Feed format identifier registered for index feeds.
pub const INDEX_FEED_FORMAT: &str = "indexed-v1";

/// `kind` value of every record written to an index feed.
pub const INDEX_POINTER_KIND: &str = "index-pointer";

/// Public key material of a derived feed.
///
/// Key derivation and signing belong to the subfeed service; this type only
/// carries what it hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedKeys {
    /// Key algorithm, e.g. "ed25519"
    pub curve: String,
    /// Public key, base64 or opaque
    pub public: String,
    /// Feed ID derived from the public key
    pub id: String,
}

/// Metadata recorded on an index feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedMetadata {
    /// Query language of `query`
    pub querylang: String,
    /// Canonical query text
    pub query: String,
}

impl FeedMetadata {
    /// Metadata for indexing `query_id`.
    pub fn for_query(query_id: &QueryId) -> Self {
        Self {
            querylang: QUERY_LANG.to_string(),
            query: query_id.as_str().to_string(),
        }
    }
}

/// Descriptor of an index feed as returned by find-or-create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFeedInfo {
    /// Purpose of the subfeed (always [`INDEX_PURPOSE`] here)
    pub purpose: String,
    /// Feed ID of the index feed
    pub feed_id: String,
    /// Keys owned by the index feed
    pub keys: FeedKeys,
    /// Feed format its records are encoded under
    pub feed_format: String,
    /// Query language and canonical query
    pub metadata: FeedMetadata,
}

/// One entry of an index feed, pointing at one source entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Always [`INDEX_POINTER_KIND`]
    pub kind: String,
    /// Key of the indexed source entry
    pub indexed: MsgKey,
}

impl IndexRecord {
    /// Create a pointer to `indexed`.
    pub fn pointer(indexed: MsgKey) -> Self {
        Self {
            kind: INDEX_POINTER_KIND.to_string(),
            indexed,
        }
    }

    /// Whether this record has the index-pointer kind.
    pub fn is_pointer(&self) -> bool {
        self.kind == INDEX_POINTER_KIND
    }
}
