//! Configuration loading for index-feeds.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/index-feeds/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::FeedError;
use crate::query::PartialQuery;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to RocksDB storage directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Local identity feed ID. When unset, the identity persisted in the
    /// store is used (and minted on first open).
    #[serde(default)]
    pub identity: Option<String>,

    /// Entries read per backlog page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Queries (author omitted) to start when the engine initializes
    #[serde(default)]
    pub autostart: Vec<PartialQuery>,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", "index-feeds")
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_page_size() -> usize {
    75
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
            identity: None,
            page_size: default_page_size(),
            autostart: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/index-feeds/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (INDEX_FEEDS_*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, FeedError> {
        let config_dir = ProjectDirs::from("", "", "index-feeds")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| FeedError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| FeedError::Config(e.to_string()))?
            .set_default("page_size", default_page_size() as i64)
            .map_err(|e| FeedError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: INDEX_FEEDS_DB_PATH, INDEX_FEEDS_PAGE_SIZE, INDEX_FEEDS_IDENTITY
        builder = builder.add_source(
            Environment::with_prefix("INDEX_FEEDS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .map_err(|e| FeedError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| FeedError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.page_size == 0 {
            return Err(FeedError::Config("page_size must be > 0".to_string()));
        }
        Ok(())
    }

    /// Expand ~ in db_path to the home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        if let Some(rest) = self.db_path.strip_prefix("~/") {
            if let Some(home) = directories::BaseDirs::new() {
                return home.home_dir().join(rest);
            }
        }
        PathBuf::from(&self.db_path)
    }
}
