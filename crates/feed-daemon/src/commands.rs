//! Command implementations for the index-feeds daemon.
//!
//! Handles:
//! - start: Load config, open storage, autostart queries, run until signalled
//! - append: Add an entry to the source log
//! - index / records: Index one query's backlog, or list its index feed
//! - stats / whoami: Inspect the store

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::info;

use feed_indexing::{FeedFormat, JsonFeedFormat};
use feed_scheduler::{IndexFeedScheduler, SchedulerConfig};
use feed_storage::{SourceLog, Storage, StorageStats, SubfeedResolver};
use feed_types::{
    canonicalize, FeedMetadata, IndexFeedInfo, IndexRecord, Settings, SourceMsg, INDEX_PURPOSE,
};

use crate::cli::Cli;

/// Load settings and apply CLI overrides (highest precedence).
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(db_path) = &cli.db_path {
        settings.db_path = db_path.clone();
    }
    if let Some(identity) = &cli.identity {
        settings.identity = Some(identity.clone());
    }
    if let Some(log_level) = &cli.log_level {
        settings.log_level = log_level.clone();
    }
    Ok(settings)
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `log_level`. Logs go to stderr so
/// command output on stdout stays machine-readable.
pub fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Open RocksDB storage, creating parent directories if needed.
pub fn open_storage(settings: &Settings) -> Result<Arc<Storage>> {
    let db_path = settings.expanded_db_path();
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let storage = Storage::open_with_identity(&db_path, settings.identity.as_deref())
        .with_context(|| format!("Failed to open storage at {:?}", db_path))?;
    Ok(Arc::new(storage))
}

fn scheduler_for(storage: &Arc<Storage>, settings: &Settings) -> IndexFeedScheduler {
    IndexFeedScheduler::with_store(storage.clone(), SchedulerConfig::from_settings(settings))
}

/// Run the engine until SIGINT/SIGTERM.
///
/// 1. Open RocksDB storage
/// 2. Start the configured autostart queries
/// 3. Wait for a shutdown signal
/// 4. Stop every task and flush storage
pub async fn start_daemon(settings: &Settings) -> Result<()> {
    info!("Index feeds daemon starting...");
    info!("Configuration:");
    info!("  Database path: {}", settings.db_path);
    info!("  Page size: {}", settings.page_size);
    info!("  Autostart queries: {}", settings.autostart.len());

    let storage = open_storage(settings)?;
    let scheduler = scheduler_for(&storage, settings);
    info!(local_id = %storage.local_id(), "Local identity");

    for feed in scheduler.autostart().await {
        info!(feed_id = %feed.feed_id, query = %feed.metadata.query, "Index feed running");
    }

    shutdown_signal().await?;

    scheduler.shutdown().await;
    storage.flush().context("Failed to flush storage")?;
    info!("Index feeds daemon stopped");
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("Failed to install Ctrl+C handler")?;
                info!("Received Ctrl+C, shutting down...");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .context("Failed to install Ctrl+C handler")?;
        info!("Received Ctrl+C, shutting down...");
    }

    Ok(())
}

/// Append an entry to the source log.
///
/// `content` defaults to an empty object.
pub async fn append_entry(
    settings: &Settings,
    msg_type: &str,
    private: bool,
    content: Option<&str>,
) -> Result<SourceMsg> {
    let content = match content {
        Some(text) => serde_json::from_str(text).context("Content is not valid JSON")?,
        None => serde_json::json!({}),
    };

    let storage = open_storage(settings)?;
    let msg = storage
        .append(msg_type, private, content)
        .await
        .context("Failed to append entry")?;
    info!(key = %msg.key, sequence = msg.sequence, "Appended entry");
    Ok(msg)
}

/// Index the backlog of `query`, then stop.
pub async fn index_query(settings: &Settings, query: &str) -> Result<IndexFeedInfo> {
    let storage = open_storage(settings)?;
    let scheduler = scheduler_for(&storage, settings);

    let feed = scheduler.start(query).await.context("Failed to start query")?;
    scheduler
        .wait_backlog(query)
        .await
        .context("Failed to index backlog")?;
    let written = scheduler
        .status(query)?
        .map(|status| status.indexed_count)
        .unwrap_or_default();
    info!(feed_id = %feed.feed_id, written = written, "Backlog indexed");

    scheduler.shutdown().await;
    Ok(feed)
}

/// List the records of the index feed for `query`.
pub async fn list_records(settings: &Settings, query: &str) -> Result<Vec<IndexRecord>> {
    let storage = open_storage(settings)?;
    let (query, query_id) = canonicalize(query).context("Invalid query")?;
    query
        .ensure_author(storage.local_id())
        .context("Invalid query")?;

    let format = JsonFeedFormat;
    let feed = storage
        .find_or_create(INDEX_PURPOSE, format.name(), &FeedMetadata::for_query(&query_id))
        .await
        .context("Failed to resolve index feed")?;

    let payloads = storage
        .records(&feed.feed_id)
        .await
        .context("Failed to read index feed")?;
    payloads
        .iter()
        .map(|payload| format.decode(payload).context("Corrupt index record"))
        .collect()
}

/// Get database statistics.
pub fn show_stats(settings: &Settings) -> Result<StorageStats> {
    let storage = open_storage(settings)?;
    storage.get_stats().context("Failed to read stats")
}

/// Get the local identity of the store.
pub fn whoami(settings: &Settings) -> Result<String> {
    let storage = open_storage(settings)?;
    Ok(storage.local_id().to_string())
}
