//! Ordering and concurrency tests on a multi-threaded runtime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use e2e_tests::{
    append_entries, indexed_keys, keys, posts_query, scheduler_over, wait_for_records, WAIT,
};
use feed_storage::{MemoryStore, SourceLog, SubfeedResolver};
use feed_types::{FeedMetadata, INDEX_FEED_FORMAT, INDEX_PURPOSE};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_share_one_task() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = Arc::new(scheduler_over(store.clone(), 5));
    let query = posts_query(store.local_id());
    let posts = append_entries(&*store, &["post"; 40], 0).await;

    let starts = (0..16).map(|_| {
        let scheduler = scheduler.clone();
        let query = query.clone();
        tokio::spawn(async move { scheduler.start(query).await })
    });
    let feeds: Vec<_> = futures::future::join_all(starts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert!(feeds.iter().all(|feed| feed == &feeds[0]));
    assert_eq!(scheduler.task_count(), 1);

    scheduler.done_old(query.clone()).await.unwrap();
    assert_eq!(indexed_keys(&*store, &feeds[0].feed_id).await, keys(&posts));
    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_drained_between_backlog_and_live() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = scheduler_over(store.clone(), 4);
    let query = posts_query(store.local_id());
    let backlog = append_entries(&*store, &["post"; 10], 0).await;

    let feed = store
        .find_or_create(
            INDEX_PURPOSE,
            INDEX_FEED_FORMAT,
            &FeedMetadata::for_query(&query.id()),
        )
        .await
        .unwrap();

    // Records present when the callback runs.
    let at_drain = Arc::new(AtomicUsize::new(usize::MAX));
    {
        let at_drain = at_drain.clone();
        let store = store.clone();
        let feed_id = feed.feed_id.clone();
        scheduler
            .on_done_old(query.clone(), move || {
                at_drain.store(store.record_count(&feed_id), Ordering::SeqCst);
            })
            .unwrap();
    }

    // Keep appending while the backlog is being indexed.
    let appender = {
        let store = store.clone();
        tokio::spawn(async move {
            let mut live = Vec::new();
            for i in 0..20 {
                live.extend(append_entries(&*store, &["post"], 100 + i).await);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            live
        })
    };

    scheduler.start(query.clone()).await.unwrap();
    tokio::time::timeout(WAIT, scheduler.done_old(query.clone()))
        .await
        .expect("backlog should drain")
        .unwrap();
    let live = appender.await.unwrap();

    let drained_at = at_drain.load(Ordering::SeqCst);
    assert!(drained_at >= backlog.len(), "drained before the backlog was written");
    assert!(drained_at <= backlog.len() + live.len());

    let mut all = backlog.clone();
    all.extend(live);
    wait_for_records(&*store, &feed.feed_id, all.len()).await;
    assert_eq!(indexed_keys(&*store, &feed.feed_id).await, keys(&all));

    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_start_churn_never_duplicates() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = scheduler_over(store.clone(), 3);
    let query = posts_query(store.local_id());
    let mut posts = Vec::new();

    for round in 0..10 {
        posts.extend(append_entries(&*store, &["post"; 3], round * 3).await);
        scheduler.start(query.clone()).await.unwrap();
        if round % 2 == 0 {
            scheduler.done_old(query.clone()).await.unwrap();
        }
        scheduler.stop(query.clone());
    }

    let feed = scheduler.start(query.clone()).await.unwrap();
    wait_for_records(&*store, &feed.feed_id, posts.len()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(indexed_keys(&*store, &feed.feed_id).await, keys(&posts));

    scheduler.shutdown().await;
}
