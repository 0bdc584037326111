//! Concurrent device inventory
//!
//! [`DeviceStore`] owns every [`DeviceRecord`]. Callers only ever get clones back.
//!
//! ## Keys
//!
//! A device is keyed by its lower-cased MAC. A device seen only by IP is keyed provisionally by
//! its lowest IP, and re-keyed under its MAC as soon as a sighting carrying both arrives. A
//! secondary `ip → key` index resolves IP-only sightings and serves [`DeviceStore::get_by_ip`].
//!
//! ## Locking
//!
//! One `parking_lot::RwLock` guards the whole inventory. Reads take it shared. Every mutation,
//! including the new-device decision, runs under a single exclusive acquisition, so merges for
//! the same key are totally ordered and alerts are raised at most once per device.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, trace};

use crate::alerts::{self, Alert};
use crate::device::{self, Connection, DeviceRecord, is_zero_mac, normalize_mac};
use crate::error::StoreError;
use crate::tracker::{DEFAULT_BIN_INTERVAL, DEFAULT_TRACK_DURATION, DataTracker, DataUseAmount};

/// Source of "now" in seconds since epoch
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Filter applied to records by [`DeviceStore::list`] and friends
///
/// A list of predicates is a conjunction. An empty list matches everything.
pub type ListPredicate = Box<dyn Fn(&DeviceRecord) -> bool + Send + Sync>;

/// Accepts records last updated at or after `cutoff` (seconds since epoch)
pub fn updated_since(cutoff: i64) -> ListPredicate {
    Box::new(move |record| record.last_update >= cutoff)
}

/// Accepts records last updated at or before `cutoff` (seconds since epoch)
pub fn updated_at_or_before(cutoff: i64) -> ListPredicate {
    Box::new(move |record| record.last_update <= cutoff)
}

/// Result of a merge-or-add
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Clone of the record as stored after the merge
    pub record: DeviceRecord,

    /// Set when the merge introduced a device the store had never seen
    pub alert: Option<Alert>,

    /// True if no existing record was resolved and a new one was inserted
    pub created: bool,
}

/// Per-device session totals shown next to the record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    pub byte_transfer_rate: u64,
    pub num_sessions: u64,
    pub data_usage: u64,
    pub rx_total: u64,
    pub tx_total: u64,
}

/// A device record plus its session and data-use totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    #[serde(flatten)]
    pub record: DeviceRecord,

    pub session_detail: SessionDetail,
}

#[derive(Debug)]
struct StoredDevice {
    record: DeviceRecord,
    data: DataTracker,
}

impl StoredDevice {
    fn summary(&self) -> DeviceSummary {
        let data = self.data.total_use();

        DeviceSummary {
            record: self.record.clone(),
            session_detail: SessionDetail {
                byte_transfer_rate: self
                    .record
                    .connections
                    .iter()
                    .map(|c| c.byte_rate)
                    .fold(0, u64::saturating_add),
                num_sessions: self.record.connections.len() as u64,
                data_usage: data.total(),
                rx_total: data.rx,
                tx_total: data.tx,
            },
        }
    }
}

#[derive(Debug, Default)]
struct Inventory {
    devices: BTreeMap<String, StoredDevice>,
    by_ip: HashMap<String, String>,
}

impl Inventory {
    /// Find the key of the record `mac`/`ips` describe, if any
    ///
    /// A MAC match wins. Otherwise the first IP owned by a record that does not carry a
    /// different MAC.
    fn resolve(&self, mac: &str, ips: &BTreeSet<String>) -> Option<String> {
        if !mac.is_empty() && self.devices.contains_key(mac) {
            return Some(mac.to_string());
        }

        ips.iter().find_map(|ip| {
            let key = self.by_ip.get(ip)?;
            let owner = &self.devices.get(key)?.record;
            (mac.is_empty() || owner.mac_address.is_empty()).then(|| key.clone())
        })
    }

    /// Remove a device, handing each IP it owned in the index to another holder of that IP
    fn take(&mut self, key: &str) -> Option<StoredDevice> {
        let stored = self.devices.remove(key)?;
        for ip in stored.record.device_ips() {
            if !self.by_ip.get(&ip).is_some_and(|owner| owner == key) {
                continue;
            }

            let successor = self
                .devices
                .iter()
                .find(|(_, other)| other.record.device_ips().contains(&ip))
                .map(|(other_key, _)| other_key.clone());
            match successor {
                Some(other_key) => {
                    self.by_ip.insert(ip, other_key);
                }
                None => {
                    self.by_ip.remove(&ip);
                }
            }
        }
        Some(stored)
    }

    fn put(&mut self, key: String, stored: StoredDevice) -> &StoredDevice {
        for ip in stored.record.device_ips() {
            self.by_ip.insert(ip, key.clone());
        }
        self.devices.insert(key.clone(), stored);
        &self.devices[&key]
    }

    fn matching<'a>(
        &'a self,
        predicates: &'a [ListPredicate],
    ) -> impl Iterator<Item = &'a StoredDevice> + 'a {
        self.devices
            .values()
            .filter(move |stored| predicates.iter().all(|p| p(&stored.record)))
    }
}

/// Key a record would be stored under: its MAC, else its lowest IP
fn key_for(record: &DeviceRecord) -> Option<String> {
    if !record.mac_address.is_empty() {
        return Some(record.mac_address.clone());
    }
    record.device_ips().into_iter().next()
}

/// In-memory device inventory
pub struct DeviceStore {
    inventory: RwLock<Inventory>,
    clock: Clock,
    bin_interval: TimeDelta,
    max_track: TimeDelta,
}

impl Default for DeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DeviceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceStore")
            .field("devices", &self.len())
            .field("bin_interval", &self.bin_interval)
            .field("max_track", &self.max_track)
            .finish()
    }
}

impl DeviceStore {
    pub fn new() -> Self {
        Self {
            inventory: RwLock::new(Inventory::default()),
            clock: Arc::new(|| Utc::now().timestamp()),
            bin_interval: DEFAULT_BIN_INTERVAL,
            max_track: DEFAULT_TRACK_DURATION,
        }
    }

    /// Replace the clock used to stamp `LastUpdate`
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Accepts records updated within `period` of the store's clock
    ///
    /// The cutoff is taken from the same clock that stamps `LastUpdate`, so an injected clock
    /// governs both.
    pub fn updated_within(&self, period: TimeDelta) -> ListPredicate {
        updated_since(self.cutoff(period))
    }

    /// Accepts records whose last update is at least `period` old by the store's clock
    pub fn last_update_older_than(&self, period: TimeDelta) -> ListPredicate {
        updated_at_or_before(self.cutoff(period))
    }

    fn cutoff(&self, period: TimeDelta) -> i64 {
        (self.clock)().saturating_sub(period.num_seconds())
    }

    /// Bin width and history length of the per-device data trackers
    pub fn with_tracker_limits(mut self, bin_interval: TimeDelta, max_track: TimeDelta) -> Self {
        self.bin_interval = bin_interval;
        self.max_track = max_track;
        self
    }

    /// Merge `incoming` into the record it resolves to, or insert it
    ///
    /// Returns a clone of the stored record and the new-device alert, if one is due. The store is
    /// untouched when an error is returned.
    pub fn merge_or_add(&self, incoming: DeviceRecord) -> Result<MergeOutcome, StoreError> {
        self.merge_locked(incoming, true, |_| {})
    }

    /// Like [`merge_or_add`](Self::merge_or_add), calling `on_changed` with the stored record
    /// before the write lock is released
    ///
    /// `on_changed` must be cheap and must not touch the store.
    pub fn merge_or_add_with<F>(
        &self,
        incoming: DeviceRecord,
        on_changed: F,
    ) -> Result<MergeOutcome, StoreError>
    where
        F: FnOnce(&DeviceRecord),
    {
        self.merge_locked(incoming, true, on_changed)
    }

    /// Merge a batch of records without raising alerts
    ///
    /// Used to preload the inventory at startup. Records the store rejects are skipped. Returns
    /// the number of records merged.
    pub fn warm_up(&self, records: impl IntoIterator<Item = DeviceRecord>) -> usize {
        let mut merged = 0;
        for record in records {
            match self.merge_locked(record, false, |_| {}) {
                Ok(_) => merged += 1,
                Err(e) => debug!("skipping warm-up record: {e}"),
            }
        }
        merged
    }

    fn merge_locked<F>(
        &self,
        mut incoming: DeviceRecord,
        raise_alerts: bool,
        on_changed: F,
    ) -> Result<MergeOutcome, StoreError>
    where
        F: FnOnce(&DeviceRecord),
    {
        let mac = normalize_mac(&incoming.mac_address)?;
        if is_zero_mac(&mac) {
            return Err(StoreError::ZeroMac);
        }
        incoming.mac_address = mac;

        let ips = incoming.device_ips();
        if incoming.mac_address.is_empty() && ips.is_empty() {
            return Err(StoreError::Unkeyable);
        }

        let now = (self.clock)();
        let mut inventory = self.inventory.write();

        let resolved = inventory.resolve(&incoming.mac_address, &ips);
        let alert = if raise_alerts {
            alerts::decide_new_device(&incoming, resolved.is_some())
        } else {
            None
        };

        let mut record = match resolved.as_ref().and_then(|key| inventory.devices.get(key)) {
            Some(stored) => device::merge(&stored.record, &incoming),
            None => incoming,
        };
        record.last_update = now;
        let key = key_for(&record).ok_or(StoreError::Unkeyable)?;

        let previous = resolved.as_deref().and_then(|old| inventory.take(old));
        let created = previous.is_none();
        let data = match previous {
            Some(stored) => stored.data,
            None => DataTracker::new(self.bin_interval, self.max_track),
        };

        if let Some(old) = resolved.filter(|old| *old != key) {
            debug!(from = %old, to = %key, "re-keying device");
        }
        trace!(%key, created, "merged device");

        let stored = inventory.put(key, StoredDevice { record, data });
        on_changed(&stored.record);

        Ok(MergeOutcome {
            record: stored.record.clone(),
            alert,
            created,
        })
    }

    /// Snapshot of every record matching all `predicates`, ordered by key
    pub fn list(&self, predicates: &[ListPredicate]) -> Vec<DeviceRecord> {
        self.inventory
            .read()
            .matching(predicates)
            .map(|stored| stored.record.clone())
            .collect()
    }

    pub fn get_by_ip(&self, ip: &str) -> Option<DeviceRecord> {
        let inventory = self.inventory.read();
        let key = inventory.by_ip.get(ip)?;
        inventory.devices.get(key).map(|stored| stored.record.clone())
    }

    pub fn get_by_mac(&self, mac: &str) -> Option<DeviceRecord> {
        let mac = normalize_mac(mac).ok().filter(|mac| !mac.is_empty())?;
        self.inventory
            .read()
            .devices
            .get(&mac)
            .map(|stored| stored.record.clone())
    }

    /// Run `f` over a snapshot of the matching records while holding the read lock
    pub fn apply<R, E, F>(&self, predicates: &[ListPredicate], f: F) -> Result<R, E>
    where
        F: FnOnce(&[DeviceRecord]) -> Result<R, E>,
    {
        let inventory = self.inventory.read();
        let snapshot: Vec<DeviceRecord> = inventory
            .matching(predicates)
            .map(|stored| stored.record.clone())
            .collect();
        f(&snapshot)
    }

    /// Summaries of the matching devices, with session and data-use totals
    pub fn summaries(&self, predicates: &[ListPredicate]) -> Vec<DeviceSummary> {
        self.inventory
            .read()
            .matching(predicates)
            .map(StoredDevice::summary)
            .collect()
    }

    /// JSON array of [`DeviceSummary`] for the matching devices
    pub fn to_json(&self, predicates: &[ListPredicate]) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.summaries(predicates))
    }

    /// Delete every record matching all `predicates`, returning what was removed
    pub fn prune(&self, predicates: &[ListPredicate]) -> Vec<DeviceRecord> {
        let mut inventory = self.inventory.write();
        let keys: Vec<String> = inventory
            .devices
            .iter()
            .filter(|(_, stored)| predicates.iter().all(|p| p(&stored.record)))
            .map(|(key, _)| key.clone())
            .collect();

        keys.iter()
            .filter_map(|key| inventory.take(key))
            .map(|stored| {
                debug!(mac = %stored.record.mac_address, "deleted device entry");
                stored.record
            })
            .collect()
    }

    /// Replace every device's connections with `connections`, attached by client address
    ///
    /// Connections whose client address matches no device are dropped. Returns the number
    /// attached.
    pub fn merge_connections(&self, connections: Vec<Connection>) -> usize {
        let mut inventory = self.inventory.write();
        for stored in inventory.devices.values_mut() {
            stored.record.connections.clear();
        }

        let mut attached = 0;
        for connection in connections {
            let Some(key) = inventory.by_ip.get(&connection.client_address).cloned() else {
                continue;
            };
            if let Some(stored) = inventory.devices.get_mut(&key) {
                stored.record.connections.push(connection);
                attached += 1;
            }
        }
        attached
    }

    /// Record traffic for the device owning `ip`; false if there is none
    pub fn incr_data(&self, ip: &str, amount: DataUseAmount) -> bool {
        let mut inventory = self.inventory.write();
        let Some(key) = inventory.by_ip.get(ip).cloned() else {
            return false;
        };
        match inventory.devices.get_mut(&key) {
            Some(stored) => {
                stored.data.incr_data(amount);
                true
            }
            None => false,
        }
    }

    /// Total retained traffic of the device owning `ip`
    pub fn data_use(&self, ip: &str) -> Option<DataUseAmount> {
        let inventory = self.inventory.read();
        let key = inventory.by_ip.get(ip)?;
        inventory.devices.get(key).map(|stored| stored.data.total_use())
    }

    /// Restrict every device's data history to the last `period`
    pub fn trim_data_use_since(&self, period: TimeDelta) {
        let mut inventory = self.inventory.write();
        for stored in inventory.devices.values_mut() {
            stored.data.restrict_to_interval(period);
        }
    }

    pub fn len(&self) -> usize {
        self.inventory.read().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inventory.read().devices.is_empty()
    }
}
