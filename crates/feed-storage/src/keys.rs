//! Key encoding and decoding for storage layer.
//!
//! Numeric components are zero-padded to 20 digits so that lexicographic
//! key order equals numeric order, which the source scans and the
//! latest-record lookup rely on.

use crate::error::StorageError;

/// Key for source log entries
/// Format: src:{sequence:020}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceKey {
    /// Position in the source log
    pub sequence: u64,
}

impl SourceKey {
    /// Create a new source key with given sequence
    pub fn new(sequence: u64) -> Self {
        Self { sequence }
    }

    /// Encode key to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("src:{:020}", self.sequence).into_bytes()
    }

    /// Decode key from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 2 || parts[0] != "src" {
            return Err(StorageError::Key(format!("Invalid source key format: {}", s)));
        }

        let sequence: u64 = parts[1]
            .parse()
            .map_err(|e| StorageError::Key(format!("Invalid sequence: {}", e)))?;

        Ok(Self { sequence })
    }
}

/// Key for one record of an index feed
/// Format: idx:{feed_id}:{position:020}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecordKey {
    /// Feed the record belongs to
    pub feed_id: String,
    /// Position within the feed, starting at 1
    pub position: u64,
}

impl IndexRecordKey {
    /// Create a key for `position` in `feed_id`
    pub fn new(feed_id: impl Into<String>, position: u64) -> Self {
        Self {
            feed_id: feed_id.into(),
            position,
        }
    }

    /// Encode key to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("idx:{}:{:020}", self.feed_id, self.position).into_bytes()
    }

    /// Prefix shared by every record of `feed_id`
    pub fn prefix(feed_id: &str) -> Vec<u8> {
        format!("idx:{}:", feed_id).into_bytes()
    }

    /// Key sorting after every record of `feed_id`, for reverse seeks
    pub fn prefix_end(feed_id: &str) -> Vec<u8> {
        format!("idx:{}:~", feed_id).into_bytes()
    }

    /// Decode key from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;

        // Feed IDs may contain ':', so split from the right.
        let rest = s
            .strip_prefix("idx:")
            .ok_or_else(|| StorageError::Key(format!("Invalid index key format: {}", s)))?;
        let (feed_id, position) = rest
            .rsplit_once(':')
            .ok_or_else(|| StorageError::Key(format!("Invalid index key format: {}", s)))?;

        let position: u64 = position
            .parse()
            .map_err(|e| StorageError::Key(format!("Invalid position: {}", e)))?;

        Ok(Self {
            feed_id: feed_id.to_string(),
            position,
        })
    }
}

/// Key for find-or-create lookups of derived feeds
/// Format: sub:{purpose}:{feed_format}:{querylang}:{query}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubfeedKey(String);

impl SubfeedKey {
    pub fn new(purpose: &str, feed_format: &str, querylang: &str, query: &str) -> Self {
        Self(format!("sub:{}:{}:{}:{}", purpose, feed_format, querylang, query))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }
}
