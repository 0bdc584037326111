//! Helper functions for integration tests

use std::sync::Arc;
use std::time::Duration;

use discoverd::{
    actors::{
        ingest::{IngestConfig, IngestHandle, MergedCallback},
        publisher::{PublisherConfig, PublisherHandle},
    },
    alerts::MemoryAlertSink,
    device::{CollectorRecord, DeviceRecord, Lldp, Neigh, Nmap},
    store::DeviceStore,
    transport::{LocalBus, topics::DEVICE_TOPIC},
};
use tokio::task::JoinHandle;

pub const MAC_A: &str = "aa:bb:cc:dd:ee:01";
pub const IP_A: &str = "192.168.1.10";

pub fn lldp_sighting(ip: &str, mac: &str) -> CollectorRecord {
    CollectorRecord::Lldp(Lldp {
        ip: ip.to_string(),
        mac: mac.to_string(),
        sys_name: "switch-01".to_string(),
        ..Default::default()
    })
}

pub fn neigh_sighting(ip: &str, mac: &str) -> CollectorRecord {
    CollectorRecord::Neigh(Neigh {
        ip: ip.to_string(),
        mac: mac.to_string(),
        state: "REACHABLE".to_string(),
        interface: "eth0".to_string(),
        ..Default::default()
    })
}

pub fn nmap_sighting(ip: &str, mac: &str) -> CollectorRecord {
    CollectorRecord::Nmap(Nmap {
        ip: ip.to_string(),
        mac: mac.to_string(),
        hostname: "printer".to_string(),
        ..Default::default()
    })
}

pub fn test_publisher_config(capacity: usize) -> PublisherConfig {
    PublisherConfig {
        capacity,
        shutdown_timeout: Duration::from_millis(500),
    }
}

pub fn test_ingest_config() -> IngestConfig {
    IngestConfig {
        shutdown_timeout: Duration::from_millis(500),
        ..Default::default()
    }
}

/// Poll `check` until it holds, giving up after two seconds
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Publisher, ingestion and store wired over one in-process bus
///
/// Merged records are republished on the device topic, as the daemon does.
pub struct TestEngine {
    pub bus: LocalBus,
    pub publisher: PublisherHandle,
    pub store: Arc<DeviceStore>,
    pub alerts: MemoryAlertSink,
    pub ingest: IngestHandle,
    bridge: JoinHandle<()>,
}

impl TestEngine {
    pub async fn start() -> Self {
        let bus = LocalBus::new(256);
        let publisher = PublisherHandle::spawn(Arc::new(bus.clone()), test_publisher_config(64));
        let store = Arc::new(DeviceStore::new());
        let alerts = MemoryAlertSink::new();

        let republisher = publisher.clone();
        let on_merged: MergedCallback = Arc::new(move |record: DeviceRecord| {
            republisher.publish_json(DEVICE_TOPIC, &record).unwrap();
        });

        let ingest = IngestHandle::spawn(
            store.clone(),
            Arc::new(alerts.clone()),
            Some(on_merged),
            test_ingest_config(),
        );

        let subscribers = bus.subscriber_count();
        let bridge = ingest.bridge(Arc::new(bus.clone()));
        assert!(
            eventually(|| bus.subscriber_count() > subscribers).await,
            "bridge never subscribed"
        );

        Self {
            bus,
            publisher,
            store,
            alerts,
            ingest,
            bridge,
        }
    }

    pub async fn shutdown(self) {
        self.bridge.abort();
        self.ingest.shutdown().await;
        self.publisher.shutdown().await;
    }
}
