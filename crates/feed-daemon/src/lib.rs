//! Index feeds daemon library exports.
//!
//! This crate provides the CLI binary for the index-feeds engine.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (start, append, index, records, stats, whoami)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands};
pub use commands::{
    append_entry, index_query, init_logging, list_records, load_settings, open_storage,
    show_stats, start_daemon, whoami,
};
