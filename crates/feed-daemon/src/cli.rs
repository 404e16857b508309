//! CLI argument parsing for the index-feeds daemon.
//!
//! CLI flags override all other config sources.

use clap::{Parser, Subcommand};

/// Index Feeds Daemon
///
/// Maintains query-derived index feeds over the local source log.
#[derive(Parser, Debug)]
#[command(name = "index-feeds")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/index-feeds/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override database path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    /// Override the local identity
    #[arg(long, global = true)]
    pub identity: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Daemon commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the engine with the configured autostart queries until interrupted
    Start,

    /// Append an entry to the source log
    Append {
        /// Entry type
        #[arg(short = 't', long = "type")]
        msg_type: String,

        /// Mark the entry private
        #[arg(long)]
        private: bool,

        /// Entry content as JSON
        #[arg(long)]
        content: Option<String>,
    },

    /// Index the backlog of a query, then stop
    Index {
        /// Query as JSON, e.g. '{"author":"@...","type":"post","private":false}'
        query: String,
    },

    /// Print the records of a query's index feed
    Records {
        /// Query as JSON
        query: String,
    },

    /// Show database statistics
    Stats,

    /// Print the local identity
    Whoami,
}
