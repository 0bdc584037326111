//! Device records and merge semantics
//!
//! A [`DeviceRecord`] is the canonical view of one device. Collectors only ever know a slice of
//! it (an LLDP neighbour, a kernel neighbour entry, an nmap host), so records are built from
//! partial sightings and folded together with [`merge`].
//!
//! ## Merge rule
//!
//! Field-level union, new wins if present:
//!
//! ```text
//! mac_address / ipv4_address   incoming replaces existing when non-empty
//! last_update                  max(existing, incoming)
//! lldp / neigh / nmap / arp    union by IP key, incoming entry replaces existing entry
//! connections                  incoming connections not already present are appended
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::DeviceError;
use crate::tracker::DataUseAmount;

/// The all-zero MAC address, reported by collectors for incomplete neighbour entries
pub const ZERO_MAC: &str = "00:00:00:00:00:00";

static MAC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{2}(:[0-9A-Fa-f]{2}){5}$").expect("MAC pattern is a valid regex")
});

/// Returns true if `mac` is a colon-separated 48-bit hardware address
pub fn is_mac_address(mac: &str) -> bool {
    MAC_PATTERN.is_match(mac)
}

/// Returns true if `mac` is the all-zero address
pub fn is_zero_mac(mac: &str) -> bool {
    mac == ZERO_MAC
}

/// Normalise a MAC address for use as a store key
///
/// Empty stays empty (IP-only sighting). Anything else must be a valid MAC and is lower-cased.
pub fn normalize_mac(mac: &str) -> Result<String, DeviceError> {
    let mac = mac.trim();
    if mac.is_empty() {
        return Ok(String::new());
    }
    if !is_mac_address(mac) {
        return Err(DeviceError::InvalidMac(mac.to_string()));
    }
    Ok(mac.to_ascii_lowercase())
}

/// LLDP chassis or MED capability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LldpCapability {
    pub capability: String,
    pub enabled: bool,
}

/// Sighting reported by the LLDP neighbour collector
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Lldp {
    pub ip: String,
    pub mac: String,
    pub last_update: i64,
    pub sys_name: String,
    pub sys_desc: String,
    pub chassis_capabilities: Vec<LldpCapability>,
    pub device_type: String,
    pub med_capabilities: Vec<LldpCapability>,
    pub inventory_hw_rev: String,
    pub inventory_soft_rev: String,
    pub inventory_serial: String,
    pub inventory_asset_tag: String,
    pub inventory_model: String,
    pub inventory_vendor: String,
}

/// Sighting reported by the kernel neighbour table collector
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Neigh {
    pub ip: String,
    pub mac: String,
    pub last_update: i64,
    pub state: String,
    pub interface: String,
}

/// Open port found by an nmap scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NmapPort {
    pub port: u16,
    pub protocol: String,
    pub state: String,
}

/// Sighting reported by the nmap collector
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Nmap {
    pub ip: String,
    pub mac: String,
    pub last_update: i64,
    pub hostname: String,
    pub mac_vendor: String,
    pub uptime: String,
    pub last_boot: String,
    pub os: String,
    pub open_ports: Vec<NmapPort>,
}

/// Sighting reported by the ARP table collector
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Arp {
    pub ip: String,
    pub mac: String,
    pub last_update: i64,
    pub interface: String,
}

/// Active network flow attributed to a device by the connection tracker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Connection {
    pub client_address: String,
    pub client_port: u16,
    pub server_address: String,
    pub server_port: u16,
    pub protocol: String,
    /// Bytes per second across both directions
    pub byte_rate: u64,
}

/// Traffic counted for one IP since the previous report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataUseReport {
    pub ip: String,

    #[serde(flatten)]
    pub amount: DataUseAmount,
}

/// Canonical record for one device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceRecord {
    #[serde(rename = "macAddress")]
    pub mac_address: String,

    #[serde(rename = "IPv4Address")]
    pub ipv4_address: String,

    /// Seconds since epoch, stamped by the store on every merge
    #[serde(rename = "LastUpdate")]
    pub last_update: i64,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub lldp: BTreeMap<String, Lldp>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub neigh: BTreeMap<String, Neigh>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub nmap: BTreeMap<String, Nmap>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub arp: BTreeMap<String, Arp>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<Connection>,
}

impl DeviceRecord {
    /// Create an empty record for the given MAC
    pub fn with_mac(mac: impl Into<String>) -> Self {
        Self {
            mac_address: mac.into(),
            ..Self::default()
        }
    }

    /// IPs a collector reported this record on: the keys of the collector maps
    pub fn collector_ips(&self) -> BTreeSet<String> {
        self.neigh
            .keys()
            .chain(self.lldp.keys())
            .chain(self.nmap.keys())
            .chain(self.arp.keys())
            .cloned()
            .collect()
    }

    /// Set of every IP this record has been seen on
    ///
    /// [`Self::collector_ips`] plus `ipv4_address` when set.
    pub fn device_ips(&self) -> BTreeSet<String> {
        let mut ips = self.collector_ips();

        if !self.ipv4_address.is_empty() {
            ips.insert(self.ipv4_address.clone());
        }

        ips
    }

    /// A record with no MAC and no IP cannot be keyed and must never be stored
    pub fn is_empty(&self) -> bool {
        self.mac_address.is_empty() && self.device_ips().is_empty()
    }
}

/// Merge `incoming` into `existing`, returning the combined record
///
/// Pure function: no I/O, no clock. `merge(&DeviceRecord::default(), r) == r` and
/// `merge(r, r) == r`.
pub fn merge(existing: &DeviceRecord, incoming: &DeviceRecord) -> DeviceRecord {
    let mut merged = existing.clone();

    if !incoming.mac_address.is_empty() {
        merged.mac_address = incoming.mac_address.clone();
    }
    if !incoming.ipv4_address.is_empty() {
        merged.ipv4_address = incoming.ipv4_address.clone();
    }
    merged.last_update = existing.last_update.max(incoming.last_update);

    union_into(&mut merged.lldp, &incoming.lldp);
    union_into(&mut merged.neigh, &incoming.neigh);
    union_into(&mut merged.nmap, &incoming.nmap);
    union_into(&mut merged.arp, &incoming.arp);

    for connection in &incoming.connections {
        if !existing.connections.contains(connection) {
            merged.connections.push(connection.clone());
        }
    }

    merged
}

fn union_into<V: Clone>(target: &mut BTreeMap<String, V>, source: &BTreeMap<String, V>) {
    for (ip, value) in source {
        target.insert(ip.clone(), value.clone());
    }
}

/// A typed sighting from one collector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorRecord {
    Lldp(Lldp),
    Neigh(Neigh),
    Nmap(Nmap),
    Arp(Arp),
}

impl CollectorRecord {
    fn name(&self) -> &'static str {
        match self {
            CollectorRecord::Lldp(_) => "LLDP",
            CollectorRecord::Neigh(_) => "NEIGH",
            CollectorRecord::Nmap(_) => "NMAP",
            CollectorRecord::Arp(_) => "ARP",
        }
    }

    fn ip_and_mac(&mut self) -> (&mut String, &mut String) {
        match self {
            CollectorRecord::Lldp(r) => (&mut r.ip, &mut r.mac),
            CollectorRecord::Neigh(r) => (&mut r.ip, &mut r.mac),
            CollectorRecord::Nmap(r) => (&mut r.ip, &mut r.mac),
            CollectorRecord::Arp(r) => (&mut r.ip, &mut r.mac),
        }
    }

    /// Upper-case the IP and MAC strings, as collectors publish them
    pub fn normalize(&mut self) {
        let (ip, mac) = self.ip_and_mac();
        *ip = ip.to_uppercase();
        *mac = mac.to_uppercase();
    }

    /// Wrap the sighting into a minimal device record
    ///
    /// The record's MAC comes from the sighting and its collector map is seeded with this
    /// single entry, keyed by the sighting's IP.
    pub fn into_device_record(self) -> Result<DeviceRecord, DeviceError> {
        let collector = self.name();
        let mut record = DeviceRecord::default();

        match self {
            CollectorRecord::Lldp(lldp) => {
                require_ip(&lldp.ip, collector)?;
                record.mac_address = lldp.mac.clone();
                record.last_update = lldp.last_update;
                record.lldp.insert(lldp.ip.clone(), lldp);
            }
            CollectorRecord::Neigh(neigh) => {
                require_ip(&neigh.ip, collector)?;
                record.mac_address = neigh.mac.clone();
                record.last_update = neigh.last_update;
                record.neigh.insert(neigh.ip.clone(), neigh);
            }
            CollectorRecord::Nmap(nmap) => {
                require_ip(&nmap.ip, collector)?;
                record.mac_address = nmap.mac.clone();
                record.last_update = nmap.last_update;
                record.nmap.insert(nmap.ip.clone(), nmap);
            }
            CollectorRecord::Arp(arp) => {
                require_ip(&arp.ip, collector)?;
                record.mac_address = arp.mac.clone();
                record.last_update = arp.last_update;
                record.arp.insert(arp.ip.clone(), arp);
            }
        }

        Ok(record)
    }
}

fn require_ip(ip: &str, collector: &'static str) -> Result<(), DeviceError> {
    if ip.is_empty() {
        return Err(DeviceError::MissingIp { collector });
    }
    Ok(())
}
