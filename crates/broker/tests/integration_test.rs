//! Integration tests for the broker.
//!
//! These require a running Redis instance.
//! Run with: cargo test --test integration_test -- --ignored

use std::time::Duration;

use broker::feeds::Priority;
use broker::{Broker, BrokerConfig, FeedType};

const REDIS_URL: &str = "redis://127.0.0.1:6379";

async fn connect(listen: bool) -> std::sync::Arc<Broker> {
    let config = BrokerConfig {
        redis_url: REDIS_URL.to_string(),
        listen,
        ..BrokerConfig::default()
    };
    Broker::connect(config).await.expect("failed to connect")
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_feed_publish_and_retract() {
    let broker = connect(false).await;
    let name = format!("test-feed-{}", uuid::Uuid::new_v4().simple());
    let handle = broker.create_feed(&name, FeedType::Feed).await.unwrap();
    let feed = handle.as_feed().unwrap();

    let id = feed.publish("hello", None).await.unwrap();
    let ids = feed.get_ids().await.unwrap();
    assert_eq!(ids, vec![id.clone()]);
    assert_eq!(feed.get_item(&id).await.unwrap(), Some("hello".to_string()));

    feed.retract(&id).await.unwrap();
    assert!(feed.get_ids().await.unwrap().is_empty());

    broker.delete_feed(&name).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_feed_max_length_evicts_oldest() {
    let broker = connect(false).await;
    let name = format!("test-feed-{}", uuid::Uuid::new_v4().simple());
    broker
        .create_feed(&name, FeedType::Feed)
        .await
        .unwrap();
    let mut config = broker.get_config(&name).await.unwrap();
    config.fields.insert("max_length".to_string(), "2".to_string());
    broker.reconfigure(&name, config).await.unwrap();

    let handle = broker.get_feed(&name).await.unwrap();
    let feed = handle.as_feed().unwrap();

    let first = feed.publish("one", None).await.unwrap();
    feed.publish("two", None).await.unwrap();
    feed.publish("three", None).await.unwrap();

    let ids = feed.get_ids().await.unwrap();
    assert_eq!(ids.len(), 2);
    assert!(!ids.contains(&first));

    broker.delete_feed(&name).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_queue_fifo_order() {
    let broker = connect(false).await;
    let name = format!("test-queue-{}", uuid::Uuid::new_v4().simple());
    let handle = broker.create_feed(&name, FeedType::Queue).await.unwrap();
    let queue = handle.as_queue().unwrap();

    queue.put("first", Priority::Normal).await.unwrap();
    queue.put("second", Priority::Normal).await.unwrap();

    let timeout = Duration::from_secs(2);
    assert_eq!(queue.get(timeout).await.unwrap(), "first");
    assert_eq!(queue.get(timeout).await.unwrap(), "second");
    assert!(queue.get(Duration::from_millis(50)).await.is_err());

    broker.delete_feed(&name).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_queue_high_priority_jumps_the_line() {
    let broker = connect(false).await;
    let name = format!("test-queue-{}", uuid::Uuid::new_v4().simple());
    let handle = broker.create_feed(&name, FeedType::Queue).await.unwrap();
    let queue = handle.as_queue().unwrap();

    queue.put("normal", Priority::Normal).await.unwrap();
    queue.put("urgent", Priority::High).await.unwrap();

    let timeout = Duration::from_secs(2);
    assert_eq!(queue.get(timeout).await.unwrap(), "urgent");
    assert_eq!(queue.get(timeout).await.unwrap(), "normal");

    broker.delete_feed(&name).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_job_happy_path() {
    let broker = connect(false).await;
    let name = format!("test-job-{}", uuid::Uuid::new_v4().simple());
    let handle = broker.create_feed(&name, FeedType::Job).await.unwrap();
    let job = handle.as_job().unwrap();

    job.put("do the thing", Priority::Normal).await.unwrap();
    let claimed = job.get(Duration::from_secs(2)).await.unwrap();
    assert_eq!(claimed.payload, "do the thing");
    assert_eq!(claimed.cancel_count, 0);

    job.finish(&claimed.id, Some("done")).await.unwrap();
    let result = job
        .get_result(&claimed.id, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(result, "done");

    broker.delete_feed(&name).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_job_cancel_increments_counter_and_requeues() {
    let broker = connect(false).await;
    let name = format!("test-job-{}", uuid::Uuid::new_v4().simple());
    let handle = broker.create_feed(&name, FeedType::Job).await.unwrap();
    let job = handle.as_job().unwrap();

    job.put("flaky task", Priority::Normal).await.unwrap();
    let first_claim = job.get(Duration::from_secs(2)).await.unwrap();
    assert_eq!(first_claim.cancel_count, 0);

    job.cancel(&first_claim.id).await.unwrap();

    let second_claim = job.get(Duration::from_secs(2)).await.unwrap();
    assert_eq!(second_claim.id, first_claim.id);
    assert_eq!(second_claim.cancel_count, 1);

    job.finish(&second_claim.id, None).await.unwrap();
    broker.delete_feed(&name).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_job_get_times_out_on_empty_queue() {
    let broker = connect(false).await;
    let name = format!("test-job-{}", uuid::Uuid::new_v4().simple());
    let handle = broker.create_feed(&name, FeedType::Job).await.unwrap();
    let job = handle.as_job().unwrap();

    let err = job.get(Duration::from_millis(50)).await.unwrap_err();
    assert!(matches!(err, broker::BrokerError::Empty));

    broker.delete_feed(&name).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_job_stall_and_retry() {
    let broker = connect(false).await;
    let name = format!("test-job-{}", uuid::Uuid::new_v4().simple());
    let handle = broker.create_feed(&name, FeedType::Job).await.unwrap();
    let job = handle.as_job().unwrap();

    job.put("stuck task", Priority::Normal).await.unwrap();
    let claimed = job.get(Duration::from_secs(2)).await.unwrap();
    job.stall(&claimed.id).await.unwrap();
    job.retry(&claimed.id).await.unwrap();

    let reclaimed = job.get(Duration::from_secs(2)).await.unwrap();
    assert_eq!(reclaimed.id, claimed.id);

    job.finish(&reclaimed.id, None).await.unwrap();
    broker.delete_feed(&name).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_sorted_feed_move_operations() {
    let broker = connect(false).await;
    let name = format!("test-sorted-{}", uuid::Uuid::new_v4().simple());
    let handle = broker
        .create_feed(&name, FeedType::SortedFeed)
        .await
        .unwrap();
    let sorted = handle.as_sorted().unwrap();

    let a = sorted.append("a").await.unwrap();
    let b = sorted.append("b").await.unwrap();
    let c = sorted.append("c").await.unwrap();
    assert_eq!(
        sorted.get_ids().await.unwrap(),
        vec![a.clone(), b.clone(), c.clone()]
    );

    sorted.move_first(&c).await.unwrap();
    assert_eq!(
        sorted.get_ids().await.unwrap(),
        vec![c.clone(), a.clone(), b.clone()]
    );

    sorted.move_after(&a, &b).await.unwrap();
    assert_eq!(
        sorted.get_ids().await.unwrap(),
        vec![c.clone(), a.clone(), b.clone()]
    );

    broker.delete_feed(&name).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_serialized_queue_round_trips_json() {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Task {
        name: String,
        attempt: u32,
    }

    let broker = connect(false).await;
    let name = format!("test-queue-{}", uuid::Uuid::new_v4().simple());
    broker.create_feed(&name, FeedType::Queue).await.unwrap();
    let handle = broker.get_feed(&name).await.unwrap();
    let inner = handle.as_queue().unwrap().clone();
    let typed = broker::feeds::SerializedQueue::<Task>::new(inner);

    let task = Task {
        name: "ship it".to_string(),
        attempt: 1,
    };
    typed.put(&task, Priority::Normal).await.unwrap();
    let received = typed.get(Duration::from_secs(2)).await.unwrap();
    assert_eq!(received, task);

    broker.delete_feed(&name).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_listener_dispatches_publish_event() {
    use std::sync::Arc;
    use tokio::sync::Mutex;

    let broker = connect(true).await;
    let name = format!("test-feed-{}", uuid::Uuid::new_v4().simple());
    broker.create_feed(&name, FeedType::Feed).await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    broker
        .register_handler(
            broker::EventKind::Publish,
            Arc::new(move |event| {
                let seen = Arc::clone(&seen_clone);
                Box::pin(async move {
                    seen.lock().await.push(event);
                    Ok(())
                })
            }),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    let handle = broker.get_feed(&name).await.unwrap();
    handle
        .as_feed()
        .unwrap()
        .publish("hi", None)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    let events = seen.lock().await;
    assert_eq!(events.len(), 1);

    broker.delete_feed(&name).await.unwrap();
    broker.close().await.unwrap();
}
