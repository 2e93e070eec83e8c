//! Redis adapter integration tests.
//!
//! Run with: `cargo test -p tempo-tests --test redis_tests --features integration`

#![cfg(feature = "integration")]

use std::sync::Arc;
use std::time::Duration;
use tempo_cache::VersionedCache;
use tempo_core::checkin::CheckinQuery;
use tempo_core::config::CacheSettings;
use tempo_core::ids::ClientId;
use tempo_core::job::{FailOutcome, InsightJob, JobState};
use tempo_core::ports::{JobQueue, KeyValueStore};
use tempo_core::range::DateRange;
use tempo_queue::QueueConfig;
use tempo_tests::context::TestContext;

const QUEUE: &str = "insights-test";

fn january() -> DateRange {
    DateRange::parse("2026-01-01", "2026-01-31").expect("valid range")
}

#[tokio::test]
async fn test_store_conditional_operations() {
    let ctx = TestContext::redis_only().await.expect("Failed to create context");
    let store = ctx.store();

    assert!(store.set_if_absent("k", "one", 60).await.unwrap());
    assert!(!store.set_if_absent("k", "two", 60).await.unwrap());
    assert_eq!(store.get("k").await.unwrap().as_deref(), Some("one"));

    assert!(!store.delete_if_equals("k", "two").await.unwrap());
    assert!(store.delete_if_equals("k", "one").await.unwrap());
    assert!(store.get("k").await.unwrap().is_none());
}

#[tokio::test]
async fn test_store_counter_and_ttl() {
    let ctx = TestContext::redis_only().await.expect("Failed to create context");
    let store = ctx.store();

    assert_eq!(store.increment("hits").await.unwrap(), 1);
    assert_eq!(store.increment("hits").await.unwrap(), 2);
    assert!(store.ttl("hits").await.unwrap().is_none());

    assert!(store.expire("hits", 30).await.unwrap());
    let ttl = store.ttl("hits").await.unwrap().expect("ttl set");
    assert!(ttl > 0 && ttl <= 30);

    store.ping().await.unwrap();
}

#[tokio::test]
async fn test_queue_deduplicates_outstanding_jobs() {
    let ctx = TestContext::redis_only().await.expect("Failed to create context");
    let queue = ctx.queue(QueueConfig::default());
    let job = InsightJob::new(ClientId::new(), january());

    let first = queue.enqueue(QUEUE, job.to_request().unwrap()).await.unwrap();
    let second = queue.enqueue(QUEUE, job.to_request().unwrap()).await.unwrap();

    assert_eq!(first.id, second.id);
    assert!(!first.duplicate);
    assert!(second.duplicate);

    let delivery = queue
        .fetch(QUEUE, Duration::from_secs(30))
        .await
        .unwrap()
        .expect("one job waiting");
    assert_eq!(delivery.id, first.id);
    assert_eq!(delivery.attempt, 1);
    assert!(queue.fetch(QUEUE, Duration::from_secs(30)).await.unwrap().is_none());

    queue.complete(QUEUE, &delivery.id).await.unwrap();
    assert_eq!(queue.state(QUEUE, &delivery.id).await.unwrap(), Some(JobState::Completed));

    // A finished job no longer absorbs new submissions.
    let rerun = queue.enqueue(QUEUE, job.to_request().unwrap()).await.unwrap();
    assert!(!rerun.duplicate);
}

#[tokio::test]
async fn test_queue_retries_then_fails() {
    let ctx = TestContext::redis_only().await.expect("Failed to create context");
    let queue = ctx.queue(
        QueueConfig::default()
            .with_max_attempts(2)
            .with_backoff_base(Duration::from_millis(50)),
    );
    let job = InsightJob::new(ClientId::new(), january());
    let handle = queue.enqueue(QUEUE, job.to_request().unwrap()).await.unwrap();

    let first = queue.fetch(QUEUE, Duration::from_secs(30)).await.unwrap().unwrap();
    let outcome = queue.fail(QUEUE, &first.id, "boom").await.unwrap();
    assert!(matches!(outcome, FailOutcome::Retrying { .. }));
    assert_eq!(queue.state(QUEUE, &handle.id).await.unwrap(), Some(JobState::Delayed));

    tokio::time::sleep(Duration::from_millis(150)).await;
    let second = queue.fetch(QUEUE, Duration::from_secs(30)).await.unwrap().unwrap();
    assert_eq!(second.attempt, 2);
    assert!(second.is_last_attempt());

    let outcome = queue.fail(QUEUE, &second.id, "boom again").await.unwrap();
    assert_eq!(outcome, FailOutcome::Failed);
    assert_eq!(queue.state(QUEUE, &handle.id).await.unwrap(), Some(JobState::Failed));
}

#[tokio::test]
async fn test_expired_lease_is_redelivered() {
    let ctx = TestContext::redis_only().await.expect("Failed to create context");
    let queue = ctx.queue(QueueConfig::default());
    let job = InsightJob::new(ClientId::new(), january());
    queue.enqueue(QUEUE, job.to_request().unwrap()).await.unwrap();

    let leased = queue.fetch(QUEUE, Duration::from_millis(100)).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    let again = queue
        .fetch(QUEUE, Duration::from_secs(30))
        .await
        .unwrap()
        .expect("lease expired, job back in line");
    assert_eq!(again.id, leased.id);
    assert_eq!(again.attempt, 2);
}

#[tokio::test]
async fn test_versioned_cache_on_redis() {
    let ctx = TestContext::redis_only().await.expect("Failed to create context");
    let cache = VersionedCache::new(Arc::new(ctx.store()), "checkins", &CacheSettings::default());
    let client = ClientId::new();
    let query = CheckinQuery {
        client_id: client,
        range: january(),
        limit: 30,
        cursor: None,
    };

    let v1 = cache.current_version(client).await.unwrap();
    cache.put(client, v1, &query, &vec!["cached".to_string()]).await.unwrap();
    let hit: Option<Vec<String>> = cache.get(client, v1, &query).await.unwrap();
    assert_eq!(hit, Some(vec!["cached".to_string()]));

    let v2 = cache.bump_version(client).await.unwrap();
    assert!(v2 > v1);
    let miss: Option<Vec<String>> = cache.get(client, v2, &query).await.unwrap();
    assert!(miss.is_none());
}
