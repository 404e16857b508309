//! Feed format for index records.
//!
//! The binary encoding and signature of index feeds belong to the feed-format
//! layer; the engine only needs to encode a record under a feed's keys and to
//! decode the latest record back. [`JsonFeedFormat`] is the implementation
//! registered under [`INDEX_FEED_FORMAT`].

use serde::{Deserialize, Serialize};

use feed_types::{FeedKeys, IndexRecord, INDEX_FEED_FORMAT};

use crate::error::IndexingError;

/// Encoder/decoder for the records of one feed format.
pub trait FeedFormat: Send + Sync {
    /// Identifier this format is registered under.
    fn name(&self) -> &str;

    /// Encode `record` for the feed owning `keys`.
    fn encode(&self, record: &IndexRecord, keys: &FeedKeys) -> Result<Vec<u8>, IndexingError>;

    /// Decode a payload produced by [`FeedFormat::encode`].
    fn decode(&self, payload: &[u8]) -> Result<IndexRecord, IndexingError>;
}

/// JSON envelope: `{"author": <feed id>, "content": <record>}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFeedFormat;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    author: &'a str,
    content: &'a IndexRecord,
}

#[derive(Deserialize)]
struct Envelope {
    #[allow(dead_code)]
    author: String,
    content: IndexRecord,
}

impl FeedFormat for JsonFeedFormat {
    fn name(&self) -> &str {
        INDEX_FEED_FORMAT
    }

    fn encode(&self, record: &IndexRecord, keys: &FeedKeys) -> Result<Vec<u8>, IndexingError> {
        let envelope = EnvelopeRef {
            author: &keys.id,
            content: record,
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    fn decode(&self, payload: &[u8]) -> Result<IndexRecord, IndexingError> {
        let envelope: Envelope = serde_json::from_slice(payload)?;
        if !envelope.content.is_pointer() {
            return Err(IndexingError::Format(format!(
                "unexpected record kind {:?}",
                envelope.content.kind
            )));
        }
        Ok(envelope.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_types::MsgKey;

    fn keys() -> FeedKeys {
        FeedKeys {
            curve: "ed25519".into(),
            public: "abc".into(),
            id: "ssb:feed/indexed-v1/abc".into(),
        }
    }

    #[test]
    fn test_name() {
        assert_eq!(JsonFeedFormat.name(), "indexed-v1");
    }

    #[test]
    fn test_encoded_shape() {
        let record = IndexRecord::pointer(MsgKey::from("%m.sha256"));
        let bytes = JsonFeedFormat.encode(&record, &keys()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["author"], "ssb:feed/indexed-v1/abc");
        assert_eq!(json["content"]["kind"], "index-pointer");
        assert_eq!(json["content"]["indexed"], "%m.sha256");

        assert_eq!(JsonFeedFormat.decode(&bytes).unwrap(), record);
    }

    #[test]
    fn test_decode_rejects_other_kinds() {
        let payload = br#"{"author":"x","content":{"kind":"about","indexed":"%m.sha256"}}"#;
        assert!(matches!(
            JsonFeedFormat.decode(payload),
            Err(IndexingError::Format(_))
        ));
        assert!(matches!(
            JsonFeedFormat.decode(b"garbage"),
            Err(IndexingError::Serialization(_))
        ));
    }
}
