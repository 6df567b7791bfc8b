//! Stress tests for the ingestion pipeline
//!
//! Many producers publish concurrently while the consumer flushes small
//! batches; every accepted event must end up in the store exactly once. The
//! queue is closed at the end so the consumer drains it before stopping.

use chrono::{Duration as ChronoDuration, Utc};
use clickstream::enrich::Enricher;
use clickstream::models::{AggregationQuery, Interval};
use clickstream::pipeline::{ingest_channel, BatchAccumulator, ConsumerLoop, Validator};
use clickstream::storage::{AnalyticsStore, SqliteStore};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Duration;

async fn create_test_storage() -> Arc<SqliteStore> {
    let storage = SqliteStore::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

async fn count_for(storage: &SqliteStore, code: &str) -> u64 {
    let query = AggregationQuery::resolve(
        code,
        None,
        Some(Utc::now() + ChronoDuration::seconds(5)),
        Some(Interval::Hour),
        Utc::now(),
    )
    .unwrap();
    storage.count(&query.scope()).await.unwrap()
}

#[tokio::test]
async fn test_concurrent_producers_lose_nothing() {
    let storage = create_test_storage().await;
    let (publisher, source) = ingest_channel(10_000);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let consumer = ConsumerLoop::new(
        source,
        Arc::new(Enricher::new(None, None, Duration::from_millis(100))),
        Validator::default(),
        BatchAccumulator::new(64, Duration::from_millis(50)),
        storage.clone(),
        Duration::from_millis(10),
        shutdown_rx,
    );
    let consumer_task = tokio::spawn(consumer.run());

    // 10 producers, 100 events each, spread over 3 codes
    let mut handles = vec![];
    for task_id in 0..10 {
        let publisher = publisher.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..100 {
                let payload = format!(r#"{{"code":"stress{}","ip":"127.0.0.1"}}"#, task_id % 3);
                publisher.publish(payload.into_bytes()).unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Closing the queue lets the consumer read everything already queued
    drop(publisher);
    let stats = consumer_task.await.unwrap();
    drop(shutdown_tx);

    assert_eq!(stats.received, 1000);
    assert_eq!(stats.events_written, 1000);
    assert_eq!(stats.events_dropped, 0);
    assert!(stats.batches_written >= 1000 / 64);

    // Task ids 0,3,6,9 -> stress0; 1,4,7 -> stress1; 2,5,8 -> stress2
    assert_eq!(count_for(&storage, "stress0").await, 400);
    assert_eq!(count_for(&storage, "stress1").await, 300);
    assert_eq!(count_for(&storage, "stress2").await, 300);
}

#[tokio::test]
async fn test_invalid_events_do_not_block_valid_ones() {
    let storage = create_test_storage().await;
    let (publisher, source) = ingest_channel(1024);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let consumer = ConsumerLoop::new(
        source,
        Arc::new(Enricher::new(None, None, Duration::from_millis(100))),
        Validator::new(8),
        BatchAccumulator::new(16, Duration::from_millis(50)),
        storage.clone(),
        Duration::from_millis(10),
        shutdown_rx,
    );
    let consumer_task = tokio::spawn(consumer.run());

    for i in 0..100 {
        let payload: Vec<u8> = match i % 4 {
            0 => br#"{"code":"mixed"}"#.to_vec(),
            1 => b"{not json".to_vec(),
            2 => br#"{"code":"much-too-long-code"}"#.to_vec(),
            _ => br#"{"ip":"127.0.0.1"}"#.to_vec(),
        };
        publisher.publish(payload).unwrap();
    }

    drop(publisher);
    let stats = consumer_task.await.unwrap();
    drop(shutdown_tx);

    assert_eq!(stats.received, 100);
    assert_eq!(stats.decode_failures, 25);
    assert_eq!(stats.rejected, 50);
    assert_eq!(stats.events_written, 25);
    assert_eq!(count_for(&storage, "mixed").await, 25);
}
