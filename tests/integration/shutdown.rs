//! Shutdown and backpressure behaviour
//!
//! Nothing here may hang: every wait is bounded by `tokio::time::timeout`.

use std::sync::Arc;
use std::time::Duration;

use discoverd::{
    actors::{
        collector::{CollectorRegistry, SchedulerHandle},
        ingest::IngestHandle,
        publisher::PublisherHandle,
    },
    alerts::MemoryAlertSink,
    store::DeviceStore,
    transport::LocalBus,
};

use crate::helpers::*;

#[tokio::test]
async fn test_publisher_never_started_does_not_block_shutdown() {
    let (publisher, _actor) =
        PublisherHandle::new(Arc::new(LocalBus::new(8)), test_publisher_config(8));

    tokio::time::timeout(Duration::from_secs(2), publisher.shutdown())
        .await
        .expect("shutdown must be bounded");
}

#[tokio::test]
async fn test_disabled_publisher_shuts_down_at_once() {
    let publisher = PublisherHandle::disabled();

    tokio::time::timeout(Duration::from_millis(100), publisher.shutdown())
        .await
        .expect("disabled publisher must not wait");
}

#[tokio::test]
async fn test_publishing_past_capacity_drops_instead_of_blocking() {
    let (publisher, _actor) =
        PublisherHandle::new(Arc::new(LocalBus::new(8)), test_publisher_config(5));

    let accepted = tokio::time::timeout(Duration::from_secs(1), async {
        (0..100)
            .filter(|i| publisher.publish("arista:discovery:device", i.to_string()))
            .count()
    })
    .await
    .expect("publishing must never block");

    assert_eq!(accepted, 5);
    assert_eq!(publisher.stats().dropped, 95);
}

#[tokio::test]
async fn test_full_engine_shutdown_is_bounded() {
    let bus = LocalBus::new(64);
    let publisher = PublisherHandle::spawn(Arc::new(bus.clone()), test_publisher_config(16));
    let store = Arc::new(DeviceStore::new());
    let ingest = IngestHandle::spawn(
        store,
        Arc::new(MemoryAlertSink::new()),
        None,
        test_ingest_config(),
    );
    let bridge = ingest.bridge(Arc::new(bus));
    let scheduler =
        SchedulerHandle::spawn(Arc::new(CollectorRegistry::new()), Duration::from_secs(60));

    tokio::time::timeout(Duration::from_secs(3), async {
        scheduler.shutdown().await.unwrap();
        bridge.abort();
        ingest.shutdown().await;
        publisher.shutdown().await;
    })
    .await
    .expect("engine shutdown must complete");

    // a second shutdown finds the actor gone and still returns
    tokio::time::timeout(Duration::from_secs(1), ingest.shutdown())
        .await
        .unwrap();
    assert!(ingest.stats().await.is_err());
}
