//! # feed-scheduler
//!
//! Scheduling engine for index feeds.
//!
//! For every query it is started with, the engine keeps exactly one task
//! writing an index feed: one index-pointer record per matching entry of
//! the local source log, in log order, first for the backlog and then for
//! every new append.
//!
//! ## Features
//!
//! - **One task per query**: semantically identical queries share a task and a feed
//! - **Resumable**: a restarted task continues after the feed's latest record
//! - **doneOld**: notification once the backlog has been indexed
//! - **Graceful shutdown**: tasks stop at their next suspension point
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use feed_scheduler::{IndexFeedScheduler, SchedulerConfig};
//! use feed_storage::MemoryStore;
//! use feed_types::Query;
//!
//! let store = Arc::new(MemoryStore::new());
//! let scheduler = IndexFeedScheduler::with_store(store.clone(), SchedulerConfig::default());
//!
//! let query = Query::new(store.local_id(), false).with_type("post");
//! let feed = scheduler.start(query.clone()).await?;
//! scheduler.done_old(query).await?;
//!
//! scheduler.shutdown().await;
//! ```

pub mod completion;
pub mod config;
pub mod error;
pub mod registry;
pub mod scheduler;
mod task;

pub use completion::CompletionSignal;
pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use registry::{TaskHandle, TaskPhase, TaskRegistry, TaskStatus};
pub use scheduler::{IndexFeedScheduler, ScheduleOutcome};
