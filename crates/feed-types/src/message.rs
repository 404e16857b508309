//! Source log entries.
//!
//! The source log is the local identity's own append-only log. Each entry
//! carries a unique key and a sequence number starting at 1.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique reference to a source log entry.
///
/// Format: `%{ulid}.sha256`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MsgKey(String);

impl MsgKey {
    /// Mint a fresh key.
    pub fn generate() -> Self {
        Self(format!("%{}.sha256", Ulid::new()))
    }

    /// Borrow the key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MsgKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MsgKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for MsgKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An entry of the source log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMsg {
    /// Unique key of this entry
    pub key: MsgKey,

    /// Feed ID of the author
    pub author: String,

    /// Position in the author's log, starting at 1
    pub sequence: u64,

    /// Append time (milliseconds since epoch)
    pub timestamp_ms: i64,

    /// Entry type, e.g. "post" or "vote"
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Whether the content is encrypted
    pub private: bool,

    /// Opaque content
    #[serde(default)]
    pub content: serde_json::Value,
}

impl SourceMsg {
    /// Create an entry with a fresh key and the current time.
    pub fn new(
        author: impl Into<String>,
        sequence: u64,
        msg_type: impl Into<String>,
        private: bool,
        content: serde_json::Value,
    ) -> Self {
        Self {
            key: MsgKey::generate(),
            author: author.into(),
            sequence,
            timestamp_ms: Utc::now().timestamp_millis(),
            msg_type: msg_type.into(),
            private,
            content,
        }
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
