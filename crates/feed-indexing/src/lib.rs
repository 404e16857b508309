//! Indexing pipeline for index-feeds.
//!
//! This crate provides the pieces one indexing task is assembled from.
//!
//! ## Key Components
//!
//! - [`CursorResolver`]: Finds where an index feed left off in the source log
//! - [`MergedStream`]: Backlog pages, one sync point, then the live tail
//! - [`IndexWriter`]: Appends one index-pointer record per entry
//! - [`FeedFormat`]: Record encoding; [`JsonFeedFormat`] registers `indexed-v1`
//! - [`IndexingError`]: Error types for indexing operations
//!
//! ## Example
//!
//! ```ignore
//! use feed_indexing::{CursorResolver, IndexWriter, MergedStream, DEFAULT_PAGE_SIZE};
//!
//! let cursor = CursorResolver::new(log.clone(), feeds.clone(), format.clone())
//!     .resolve(&feed)
//!     .await?;
//! let mut stream = MergedStream::new(log, query, cursor, DEFAULT_PAGE_SIZE);
//! let mut writer = IndexWriter::new(feeds, format, feed, cursor);
//!
//! while let Some(item) = stream.next(&cancel).await? {
//!     writer.write_if_entry(item, &cancel).await?;
//! }
//! ```

pub mod cursor;
pub mod error;
pub mod format;
pub mod merge;
pub mod writer;

pub use cursor::{CursorResolver, IndexCursor};
pub use error::IndexingError;
pub use format::{FeedFormat, JsonFeedFormat};
pub use merge::{MergedItem, MergedStream, Phase, DEFAULT_PAGE_SIZE};
pub use writer::{IndexWriter, WriteOutcome};
