//! Backlog-drained notifications.
//!
//! A query is drained once its indexing task has written every entry that
//! existed when it caught up. Drained is sticky: it survives the task being
//! stopped, and later waiters are notified immediately.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::debug;

use feed_types::QueryId;

type Waiter = Box<dyn FnOnce() + Send>;

enum DrainState {
    Pending(Vec<Waiter>),
    Drained,
}

/// One-shot "backlog drained" signal per canonical query.
pub struct CompletionSignal {
    states: Mutex<HashMap<QueryId, DrainState>>,
}

impl CompletionSignal {
    /// Create a signal with no queries drained.
    pub fn new() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueryId, DrainState>> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `callback` once `query_id` is drained.
    ///
    /// Runs immediately, on the caller's thread, if it already is.
    pub fn on_backlog_drained<F>(&self, query_id: &QueryId, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut states = self.lock();
            match states
                .entry(query_id.clone())
                .or_insert_with(|| DrainState::Pending(Vec::new()))
            {
                DrainState::Pending(waiters) => {
                    waiters.push(Box::new(callback));
                    return;
                }
                DrainState::Drained => {}
            }
        }
        callback();
    }

    /// Wait until `query_id` is drained.
    ///
    /// Never resolves if the query's task never drains its backlog.
    pub async fn wait_drained(&self, query_id: &QueryId) {
        let (tx, rx) = oneshot::channel();
        self.on_backlog_drained(query_id, move || {
            let _ = tx.send(());
        });
        if rx.await.is_err() {
            // Sender dropped with the signal; nothing left to wait for.
            std::future::pending::<()>().await;
        }
    }

    /// Mark `query_id` drained and notify its waiters.
    ///
    /// Returns the number of waiters notified. Idempotent: marking an already
    /// drained query notifies no one.
    pub fn mark_drained(&self, query_id: &QueryId) -> usize {
        let previous = self.lock().insert(query_id.clone(), DrainState::Drained);
        let waiters = match previous {
            Some(DrainState::Pending(waiters)) => waiters,
            _ => Vec::new(),
        };

        let count = waiters.len();
        debug!(query_id = %query_id, waiters = count, "Backlog drained");
        for waiter in waiters {
            waiter();
        }
        count
    }

    /// Whether `query_id` has been drained.
    pub fn is_drained(&self, query_id: &QueryId) -> bool {
        matches!(self.lock().get(query_id), Some(DrainState::Drained))
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}
