//! Storage layer for index-feeds.
//!
//! Defines the collaborator interfaces the indexing engine consumes
//! ([`SourceLog`], [`IndexFeedStore`], [`SubfeedResolver`]) and two
//! implementations of all three:
//! - [`MemoryStore`]: process-local, for tests and embedding
//! - [`Storage`]: RocksDB-backed with column family isolation, atomic
//!   source appends and a persisted local identity

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;
pub mod log;
pub mod memory;

pub use db::{Storage, StorageStats};
pub use error::StorageError;
pub use keys::{IndexRecordKey, SourceKey, SubfeedKey};
pub use log::{mint_identity, IndexFeedStore, SourceLog, SubfeedResolver};
pub use memory::MemoryStore;
