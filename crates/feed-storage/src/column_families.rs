//! Column family definitions for RocksDB.
//!
//! Each column family isolates data with different access patterns:
//! - source: Append-only source log, keyed by sequence (Universal compaction)
//! - source_keys: Message key -> sequence lookup
//! - index_feeds: Records of every index feed, keyed by feed and position
//! - subfeeds: Find-or-create registry of derived feeds
//! - meta: Store-wide values such as the local identity

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for the source log
pub const CF_SOURCE: &str = "source";

/// Column family name for the message key index
pub const CF_SOURCE_KEYS: &str = "source_keys";

/// Column family name for index feed records
pub const CF_INDEX_FEEDS: &str = "index_feeds";

/// Column family name for derived feed descriptors
pub const CF_SUBFEEDS: &str = "subfeeds";

/// Column family name for store metadata
pub const CF_META: &str = "meta";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[
    CF_SOURCE,
    CF_SOURCE_KEYS,
    CF_INDEX_FEEDS,
    CF_SUBFEEDS,
    CF_META,
];

/// Create column family options for append-only logs (compressed)
fn log_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_SOURCE, log_options()),
        ColumnFamilyDescriptor::new(CF_SOURCE_KEYS, Options::default()),
        ColumnFamilyDescriptor::new(CF_INDEX_FEEDS, log_options()),
        ColumnFamilyDescriptor::new(CF_SUBFEEDS, Options::default()),
        ColumnFamilyDescriptor::new(CF_META, Options::default()),
    ]
}
