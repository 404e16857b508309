//! # feed-types
//!
//! Shared domain types for the index-feeds system.
//!
//! This crate defines the core data structures used throughout the system:
//! - Queries: Declarative filters over the local source log, with canonical IDs
//! - Messages: Entries of the append-only source log
//! - Feeds: Index feed descriptors and the index-pointer record
//! - Settings: Configuration types
//!
//! ## Usage
//!
//! ```rust
//! use feed_types::{Query, QueryId};
//!
//! let query = Query::parse(r#"{"type":"post","private":false,"author":"@me.ed25519"}"#).unwrap();
//! let id: QueryId = query.id();
//! assert_eq!(
//!     id.as_str(),
//!     r#"{"author":"@me.ed25519","private":false,"type":"post"}"#
//! );
//! ```

pub mod config;
pub mod error;
pub mod feed;
pub mod message;
pub mod query;

pub use config::Settings;
pub use error::FeedError;
pub use feed::{
    FeedKeys, FeedMetadata, IndexFeedInfo, IndexRecord, INDEX_FEED_FORMAT, INDEX_POINTER_KIND,
    INDEX_PURPOSE, QUERY_LANG,
};
pub use message::{MsgKey, SourceMsg};
pub use query::{canonicalize, PartialQuery, Query, QueryId, QueryInput};
