//! New-device alerting
//!
//! The decision runs inside [`crate::store::DeviceStore::merge_or_add`] against the inventory as it
//! was before the merge, under the same write lock. The resulting [`Alert`] is handed back to the
//! caller, which forwards it to an [`AlertSink`]. Alerts are never persisted.
//!
//! ## Decision
//!
//! ```text
//! incoming MAC     resolves to existing record?   alert
//! ─────────────    ────────────────────────────   ───────────────────────────────
//! all-zero         -                              never
//! valid            yes (by MAC or by IP)          no
//! valid            no                             yes, macAddress=MAC, ips=its IPs
//! empty            yes (by IP)                    no
//! empty            no                             yes, macAddress="", ips=its IPs
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::actors::publisher::PublisherHandle;
use crate::device::{DeviceRecord, is_zero_mac};
use crate::transport::topics::ALERT_TOPIC;

/// Message key carried by every new-device alert
pub const NEW_DEVICE_MESSAGE: &str = "ALERT_NEW_DEVICE_DISCOVERED";

/// Category of an alert on the alert bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    Unknown,
    Discovery,
}

/// An operator alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub alert_type: AlertType,

    pub message: String,

    pub params: BTreeMap<String, String>,

    /// Stamped by the sink when the alert is sent
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Build the alert for a device seen for the first time
///
/// `ips` is the sorted, comma-joined set of collector map keys of the incoming record. A bare
/// `IPv4Address` is not reported.
pub fn new_device_alert(incoming: &DeviceRecord) -> Alert {
    let ips = incoming
        .collector_ips()
        .into_iter()
        .collect::<Vec<_>>()
        .join(",");

    let params = BTreeMap::from([
        ("macAddress".to_string(), incoming.mac_address.clone()),
        ("ips".to_string(), ips),
    ]);

    Alert {
        alert_type: AlertType::Discovery,
        message: NEW_DEVICE_MESSAGE.to_string(),
        params,
        timestamp: None,
    }
}

/// Decide whether merging `incoming` announces a new device
///
/// `resolved` tells whether the store matched `incoming` to an existing record, by MAC or by
/// one of its IPs, before the merge.
pub fn decide_new_device(incoming: &DeviceRecord, resolved: bool) -> Option<Alert> {
    if is_zero_mac(&incoming.mac_address) || resolved || incoming.is_empty() {
        return None;
    }

    Some(new_device_alert(incoming))
}

/// Destination for alerts raised by the engine
///
/// `send` must not block: implementations enqueue and return.
pub trait AlertSink: Send + Sync {
    fn send(&self, alert: Alert);
}

/// Publishes alerts as JSON on the alert topic
#[derive(Clone)]
pub struct BusAlertSink {
    publisher: PublisherHandle,
}

impl BusAlertSink {
    pub fn new(publisher: PublisherHandle) -> Self {
        Self { publisher }
    }
}

impl AlertSink for BusAlertSink {
    fn send(&self, mut alert: Alert) {
        alert.timestamp = Some(Utc::now());

        match self.publisher.publish_json(ALERT_TOPIC, &alert) {
            Ok(true) => debug!(message = %alert.message, "alert queued"),
            Ok(false) => {}
            Err(e) => warn!("unable to encode alert: {e}"),
        }
    }
}

/// Keeps every alert in memory
///
/// Used when no alert bus is configured, and by tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryAlertSink {
    alerts: Arc<Mutex<Vec<Alert>>>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }

    pub fn last(&self) -> Option<Alert> {
        self.alerts.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.lock().is_empty()
    }
}

impl AlertSink for MemoryAlertSink {
    fn send(&self, mut alert: Alert) {
        alert.timestamp = Some(Utc::now());
        self.alerts.lock().push(alert);
    }
}
