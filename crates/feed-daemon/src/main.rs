//! Index Feeds Daemon
//!
//! Maintains query-derived index feeds over the local source log.
//!
//! # Usage
//!
//! ```bash
//! index-feeds start [--db-path PATH] [--identity ID]
//! index-feeds append --type post --content '{"text":"hello"}'
//! index-feeds index '{"author":"@...","type":"post","private":false}'
//! index-feeds records '{"author":"@...","type":"post","private":false}'
//! index-feeds whoami
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/index-feeds/config.toml)
//! 3. Environment variables (INDEX_FEEDS_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use feed_daemon::{
    append_entry, index_query, init_logging, list_records, load_settings, show_stats,
    start_daemon, whoami, Cli, Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    init_logging(&settings.log_level)?;

    match cli.command {
        Commands::Start => {
            start_daemon(&settings).await?;
        }
        Commands::Append {
            msg_type,
            private,
            content,
        } => {
            let msg = append_entry(&settings, &msg_type, private, content.as_deref()).await?;
            println!("{} (sequence {})", msg.key, msg.sequence);
        }
        Commands::Index { query } => {
            let feed = index_query(&settings, &query).await?;
            println!("{}", serde_json::to_string_pretty(&feed)?);
        }
        Commands::Records { query } => {
            for record in list_records(&settings, &query).await? {
                println!("{}", serde_json::to_string(&record)?);
            }
        }
        Commands::Stats => {
            let stats = show_stats(&settings)?;
            println!("Database Statistics:");
            println!("  Source entries: {}", stats.source_count);
            println!("  Head sequence: {}", stats.head);
            println!("  Index feeds: {}", stats.subfeed_count);
            println!("  Index records: {}", stats.index_record_count);
            println!("  Disk usage: {} bytes", stats.disk_usage_bytes);
        }
        Commands::Whoami => {
            println!("{}", whoami(&settings)?);
        }
    }

    Ok(())
}
