//! Task registry for tracking running indexing tasks.
//!
//! The `TaskRegistry` owns every running task: at most one per canonical
//! query. It holds each task's cancellation handle and join handle, plus a
//! status snapshot the task updates as it makes progress.
//!
//! A stopped task leaves the registry immediately but may still be finishing
//! an append. Each query therefore also has a gate that a task holds for its
//! whole run; the next incarnation resolves its cursor only after acquiring it.
//! The gate is dropped from the registry once no incarnation holds it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

use feed_types::QueryId;

/// Lifecycle phase of an indexing task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    /// Reading the index feed's latest record
    Resolving,
    /// Indexing entries that predate the task
    Backfilling,
    /// Backlog drained; following new appends
    Live,
}

/// Status of a running task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Canonical query the task indexes
    pub query_id: QueryId,
    /// Identifier of this task incarnation
    pub task_id: String,
    /// Index feed the task writes to
    pub feed_id: String,
    /// Current phase
    pub phase: TaskPhase,
    /// Source sequence of the newest indexed entry
    pub cursor: u64,
    /// Records written by this task
    pub indexed_count: u64,
    /// When the task was started
    pub started_at: DateTime<Utc>,
    /// When the task last wrote a record
    pub last_indexed_at: Option<DateTime<Utc>>,
}

impl TaskStatus {
    /// Create the status of a task that is still resolving its cursor.
    pub fn new(query_id: QueryId, task_id: Ulid, feed_id: String) -> Self {
        Self {
            query_id,
            task_id: task_id.to_string(),
            feed_id,
            phase: TaskPhase::Resolving,
            cursor: 0,
            indexed_count: 0,
            started_at: Utc::now(),
            last_indexed_at: None,
        }
    }
}

/// Control handles for one running task.
pub struct TaskHandle {
    task_id: Ulid,
    cancel: CancellationToken,
    join: JoinHandle<()>,
    status: TaskStatus,
}

impl TaskHandle {
    /// Bundle the handles of a freshly spawned task.
    pub fn new(
        task_id: Ulid,
        cancel: CancellationToken,
        join: JoinHandle<()>,
        status: TaskStatus,
    ) -> Self {
        Self {
            task_id,
            cancel,
            join,
            status,
        }
    }

    /// Identifier of the task incarnation.
    pub fn task_id(&self) -> Ulid {
        self.task_id
    }

    /// Last status reported before the handle left the registry.
    pub fn status(&self) -> &TaskStatus {
        &self.status
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the task to exit.
    pub async fn join(self) {
        let _ = self.join.await;
    }
}

/// Registry of running indexing tasks, keyed by canonical query.
///
/// # Example
///
/// ```ignore
/// use feed_scheduler::TaskRegistry;
///
/// let registry = TaskRegistry::new();
/// let inserted = registry.register_if_absent(&query_id, || {
///     let join = tokio::spawn(run(cancel.clone()));
///     TaskHandle::new(task_id, cancel, join, TaskStatus::new(query_id.clone(), task_id, feed_id))
/// });
/// assert!(inserted);
/// assert!(registry.is_running(&query_id));
///
/// registry.stop(&query_id);
/// assert!(!registry.is_running(&query_id));
/// ```
pub struct TaskRegistry {
    tasks: RwLock<HashMap<QueryId, TaskHandle>>,
    gates: Mutex<HashMap<QueryId, Arc<tokio::sync::Mutex<()>>>>,
    /// Bumped whenever an entry leaves the registry.
    exits: watch::Sender<u64>,
}

impl TaskRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            exits: watch::Sender::new(0),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<QueryId, TaskHandle>> {
        self.tasks.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<QueryId, TaskHandle>> {
        self.tasks.write().unwrap_or_else(|e| e.into_inner())
    }

    fn notify_exit(&self) {
        self.exits.send_modify(|exits| *exits += 1);
    }

    /// Insert the task built by `spawn` unless one is already registered for
    /// `query_id`.
    ///
    /// The check and the insert happen under one write lock, so concurrent
    /// callers for the same query never both spawn. `spawn` only runs when
    /// the slot is free. Returns whether a task was inserted.
    pub fn register_if_absent<F>(&self, query_id: &QueryId, spawn: F) -> bool
    where
        F: FnOnce() -> TaskHandle,
    {
        let mut tasks = self.write();
        if tasks.contains_key(query_id) {
            return false;
        }
        tasks.insert(query_id.clone(), spawn());
        true
    }

    /// Gate serializing the task incarnations of `query_id`.
    pub fn gate(&self, query_id: &QueryId) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());
        gates.entry(query_id.clone()).or_default().clone()
    }

    /// Give back a gate obtained from [`TaskRegistry::gate`].
    ///
    /// The gate is forgotten once nobody else holds it, so a query that is
    /// never scheduled again leaves nothing behind.
    pub fn release_gate(&self, query_id: &QueryId, gate: Arc<tokio::sync::Mutex<()>>) {
        let mut gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());
        drop(gate);
        if gates
            .get(query_id)
            .is_some_and(|held| Arc::strong_count(held) == 1)
        {
            gates.remove(query_id);
        }
    }

    /// Number of queries with a live gate.
    pub fn gate_count(&self) -> usize {
        self.gates.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Apply `update` to the status of a task, if `task_id` still owns the
    /// slot.
    pub fn update<F>(&self, query_id: &QueryId, task_id: Ulid, update: F)
    where
        F: FnOnce(&mut TaskStatus),
    {
        let mut tasks = self.write();
        if let Some(handle) = tasks.get_mut(query_id) {
            if handle.task_id == task_id {
                update(&mut handle.status);
            }
        }
    }

    /// Remove a task's entry without cancelling it.
    ///
    /// Used by a task leaving on its own; a newer task registered under the
    /// same query after a stop is left untouched. Returns whether an entry
    /// was removed.
    pub fn remove_if(&self, query_id: &QueryId, task_id: Ulid) -> bool {
        let removed = {
            let mut tasks = self.write();
            match tasks.get(query_id) {
                Some(handle) if handle.task_id == task_id => tasks.remove(query_id).is_some(),
                _ => false,
            }
        };
        if removed {
            self.notify_exit();
        }
        removed
    }

    /// Cancel and deregister the task for `query_id`.
    ///
    /// Returns its handle so the caller may wait for it to exit.
    pub fn stop(&self, query_id: &QueryId) -> Option<TaskHandle> {
        let handle = self.write().remove(query_id)?;
        handle.cancel();
        self.notify_exit();
        Some(handle)
    }

    /// Cancel and deregister every task.
    pub fn stop_all(&self) -> Vec<TaskHandle> {
        let handles: Vec<TaskHandle> = self.write().drain().map(|(_, handle)| handle).collect();
        for handle in &handles {
            handle.cancel();
        }
        if !handles.is_empty() {
            self.notify_exit();
        }
        handles
    }

    /// Get the status of a task.
    pub fn get_status(&self, query_id: &QueryId) -> Option<TaskStatus> {
        self.read().get(query_id).map(|handle| handle.status.clone())
    }

    /// Get the status of all tasks, ordered by query.
    pub fn get_all_status(&self) -> Vec<TaskStatus> {
        let mut statuses: Vec<TaskStatus> =
            self.read().values().map(|handle| handle.status.clone()).collect();
        statuses.sort_by(|a, b| a.query_id.cmp(&b.query_id));
        statuses
    }

    /// Check if a task is registered for `query_id`.
    pub fn is_running(&self, query_id: &QueryId) -> bool {
        self.read().contains_key(query_id)
    }

    /// Wait until no task is registered for `query_id`.
    ///
    /// Returns at once if none is. A task that is stopped and replaced
    /// before this wakes up counts as still running.
    pub async fn wait_exit(&self, query_id: &QueryId) {
        let mut exits = self.exits.subscribe();
        while self.is_running(query_id) {
            if exits.changed().await.is_err() {
                return;
            }
        }
    }

    /// Get the number of registered tasks.
    pub fn task_count(&self) -> usize {
        self.read().len()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_types::Query;
    use std::time::Duration;

    fn query_id(msg_type: &str) -> QueryId {
        Query::new("@me.ed25519", false).with_type(msg_type).id()
    }

    /// Spawn a task that runs until cancelled.
    fn idle_task(query_id: &QueryId, task_id: Ulid) -> TaskHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let join = tokio::spawn(async move { token.cancelled().await });
        TaskHandle::new(
            task_id,
            cancel,
            join,
            TaskStatus::new(query_id.clone(), task_id, "ssb:feed/indexed-v1/x".to_string()),
        )
    }

    #[tokio::test]
    async fn test_register_and_status() {
        let registry = TaskRegistry::new();
        let qid = query_id("post");
        let task_id = Ulid::new();

        assert!(registry.register_if_absent(&qid, || idle_task(&qid, task_id)));
        assert!(registry.is_running(&qid));
        assert_eq!(registry.task_count(), 1);

        let status = registry.get_status(&qid).unwrap();
        assert_eq!(status.phase, TaskPhase::Resolving);
        assert_eq!(status.task_id, task_id.to_string());
        assert_eq!(status.indexed_count, 0);

        registry.stop_all();
    }

    #[tokio::test]
    async fn test_second_register_does_not_spawn() {
        let registry = TaskRegistry::new();
        let qid = query_id("post");
        assert!(registry.register_if_absent(&qid, || idle_task(&qid, Ulid::new())));

        let mut spawned = false;
        let inserted = registry.register_if_absent(&qid, || {
            spawned = true;
            idle_task(&qid, Ulid::new())
        });
        assert!(!inserted);
        assert!(!spawned);
        assert_eq!(registry.task_count(), 1);

        registry.stop_all();
    }

    #[tokio::test]
    async fn test_update_status() {
        let registry = TaskRegistry::new();
        let qid = query_id("post");
        let task_id = Ulid::new();
        registry.register_if_absent(&qid, || idle_task(&qid, task_id));

        registry.update(&qid, task_id, |status| {
            status.phase = TaskPhase::Live;
            status.cursor = 7;
            status.indexed_count = 3;
        });
        // A stale incarnation cannot write the slot.
        registry.update(&qid, Ulid::new(), |status| status.cursor = 99);

        let status = registry.get_status(&qid).unwrap();
        assert_eq!(status.phase, TaskPhase::Live);
        assert_eq!(status.cursor, 7);
        assert_eq!(status.indexed_count, 3);

        registry.stop_all();
    }

    #[tokio::test]
    async fn test_stop_cancels_and_returns_handle() {
        let registry = TaskRegistry::new();
        let qid = query_id("post");
        registry.register_if_absent(&qid, || idle_task(&qid, Ulid::new()));

        let handle = registry.stop(&qid).unwrap();
        assert!(!registry.is_running(&qid));
        tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .expect("cancelled task should exit");

        assert!(registry.stop(&qid).is_none());
    }

    #[tokio::test]
    async fn test_remove_if_only_matches_own_task() {
        let registry = TaskRegistry::new();
        let qid = query_id("post");
        let old_task = Ulid::new();
        registry.register_if_absent(&qid, || idle_task(&qid, old_task));

        // Stop and restart: the old task's late exit must not evict the new one.
        registry.stop(&qid);
        let new_task = Ulid::new();
        registry.register_if_absent(&qid, || idle_task(&qid, new_task));

        assert!(!registry.remove_if(&qid, old_task));
        assert!(registry.is_running(&qid));
        assert!(registry.remove_if(&qid, new_task));
        assert!(!registry.is_running(&qid));
    }

    #[tokio::test]
    async fn test_stop_all() {
        let registry = TaskRegistry::new();
        for t in ["post", "vote", "contact"] {
            let qid = query_id(t);
            registry.register_if_absent(&qid, || idle_task(&qid, Ulid::new()));
        }
        assert_eq!(registry.get_all_status().len(), 3);

        let handles = registry.stop_all();
        assert_eq!(handles.len(), 3);
        assert_eq!(registry.task_count(), 0);
        for handle in handles {
            handle.join().await;
        }
    }

    #[tokio::test]
    async fn test_gate_is_shared_per_query() {
        let registry = TaskRegistry::new();
        let post = query_id("post");

        let held = registry.gate(&post).lock_owned().await;
        assert!(registry.gate(&post).try_lock().is_err());
        assert!(registry.gate(&query_id("vote")).try_lock().is_ok());

        drop(held);
        assert!(registry.gate(&post).try_lock().is_ok());
    }

    #[tokio::test]
    async fn test_gate_is_released_when_unused() {
        let registry = TaskRegistry::new();
        let post = query_id("post");

        let first = registry.gate(&post);
        let second = registry.gate(&post);
        registry.release_gate(&post, first);
        assert_eq!(registry.gate_count(), 1);

        registry.release_gate(&post, second);
        assert_eq!(registry.gate_count(), 0);
    }

    #[tokio::test]
    async fn test_gate_survives_while_locked_elsewhere() {
        let registry = TaskRegistry::new();
        let post = query_id("post");

        let held = registry.gate(&post).lock_owned().await;
        registry.release_gate(&post, registry.gate(&post));
        assert_eq!(registry.gate_count(), 1);
        assert!(registry.gate(&post).try_lock().is_err());

        drop(held);
    }

    #[tokio::test]
    async fn test_wait_exit() {
        let registry = Arc::new(TaskRegistry::new());
        let qid = query_id("post");
        let task_id = Ulid::new();

        // Nothing registered: returns at once.
        tokio::time::timeout(Duration::from_secs(5), registry.wait_exit(&qid))
            .await
            .expect("no task to wait for");

        registry.register_if_absent(&qid, || idle_task(&qid, task_id));
        let waiter = {
            let (registry, qid) = (registry.clone(), qid.clone());
            tokio::spawn(async move { registry.wait_exit(&qid).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // Another query leaving does not wake the waiter for good.
        let vote = query_id("vote");
        registry.register_if_absent(&vote, || idle_task(&vote, Ulid::new()));
        registry.stop(&vote);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        assert!(registry.remove_if(&qid, task_id));
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter should wake on exit")
            .unwrap();
    }

    #[test]
    fn test_phase_serialization() {
        let json = serde_json::to_string(&TaskPhase::Backfilling).unwrap();
        assert_eq!(json, "\"backfilling\"");
    }
}
