//! Concurrent producers against one store

use std::sync::Arc;

use discoverd::{alerts::MemoryAlertSink, device::DeviceRecord, store::DeviceStore};
use futures::future::join_all;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_merges_of_one_device_alert_once() {
    let store = Arc::new(DeviceStore::new());
    let alerts = MemoryAlertSink::new();

    let tasks = (0..50).map(|i| {
        let store = store.clone();
        tokio::spawn(async move {
            let mut record = DeviceRecord::with_mac("AA:BB:CC:00:00:01");
            record.ipv4_address = format!("10.0.0.{}", i % 5 + 1);
            store.merge_or_add(record).unwrap()
        })
    });

    for outcome in join_all(tasks).await {
        if let Some(alert) = outcome.unwrap().alert {
            discoverd::alerts::AlertSink::send(&alerts, alert);
        }
    }

    assert_eq!(store.len(), 1);
    assert_eq!(alerts.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_devices() {
    let store = Arc::new(DeviceStore::new());

    let tasks = (0..64u8).map(|i| {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .merge_or_add(DeviceRecord::with_mac(format!("02:00:00:00:00:{i:02x}")))
                .unwrap()
                .created
        })
    });

    let created = join_all(tasks)
        .await
        .into_iter()
        .filter(|created| *created.as_ref().unwrap())
        .count();

    assert_eq!(created, 64);
    assert_eq!(store.len(), 64);
    assert_eq!(store.list(&[]).len(), 64);
}
