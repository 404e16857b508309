//! Scheduler configuration.
//!
//! Provides configuration for the scheduling engine including backlog page
//! size, autostart queries and the shutdown timeout.

use serde::{Deserialize, Serialize};

use feed_indexing::DEFAULT_PAGE_SIZE;
use feed_types::{PartialQuery, Settings};

/// Configuration for the scheduling engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Entries read per backlog page.
    /// Defaults to 75.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Queries, author omitted, started by [`autostart`].
    ///
    /// [`autostart`]: crate::IndexFeedScheduler::autostart
    #[serde(default)]
    pub autostart: Vec<PartialQuery>,

    /// Timeout in seconds for graceful shutdown.
    /// Tasks are given this much time to reach their next suspension point.
    /// Defaults to 30 seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            autostart: Vec::new(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl SchedulerConfig {
    /// Build from application settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            page_size: settings.page_size,
            autostart: settings.autostart.clone(),
            ..Default::default()
        }
    }

    /// Set the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Add an autostart query.
    pub fn with_autostart(mut self, query: PartialQuery) -> Self {
        self.autostart.push(query);
        self
    }
}
