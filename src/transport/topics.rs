//! Bus topics

use std::fmt;

pub const LLDP_TOPIC: &str = "arista:discovery:lldp";
pub const NEIGH_TOPIC: &str = "arista:discovery:neigh";
pub const NMAP_TOPIC: &str = "arista:discovery:nmap";
pub const ARP_TOPIC: &str = "arista:discovery:arp";
pub const CONNECTIONS_TOPIC: &str = "arista:discovery:connections";
pub const DATA_USE_TOPIC: &str = "arista:discovery:dataUse";
pub const DEVICE_TOPIC: &str = "arista:discovery:device";
pub const DEVICE_ENTRY_TOPIC: &str = "arista:discovery:deviceEntry";
pub const ALERT_TOPIC: &str = "arista:alertd:alert";

/// Every topic the engine publishes or consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Lldp,
    Neigh,
    Nmap,
    Arp,
    Connections,
    DataUse,
    Device,
    DeviceEntry,
    Alert,
}

impl Topic {
    /// Topics carrying raw collector sightings
    pub const COLLECTORS: [Topic; 4] = [Topic::Lldp, Topic::Neigh, Topic::Nmap, Topic::Arp];

    /// Topics carrying per-IP traffic: connection lists and data-use reports
    pub const TRAFFIC: [Topic; 2] = [Topic::Connections, Topic::DataUse];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Lldp => LLDP_TOPIC,
            Topic::Neigh => NEIGH_TOPIC,
            Topic::Nmap => NMAP_TOPIC,
            Topic::Arp => ARP_TOPIC,
            Topic::Connections => CONNECTIONS_TOPIC,
            Topic::DataUse => DATA_USE_TOPIC,
            Topic::Device => DEVICE_TOPIC,
            Topic::DeviceEntry => DEVICE_ENTRY_TOPIC,
            Topic::Alert => ALERT_TOPIC,
        }
    }

    /// Exact match on the topic string
    pub fn parse(topic: &str) -> Option<Topic> {
        [
            Topic::Lldp,
            Topic::Neigh,
            Topic::Nmap,
            Topic::Arp,
            Topic::Connections,
            Topic::DataUse,
            Topic::Device,
            Topic::DeviceEntry,
            Topic::Alert,
        ]
        .into_iter()
        .find(|t| t.as_str() == topic)
    }

    pub fn is_collector(&self) -> bool {
        Self::COLLECTORS.contains(self)
    }

    /// Everything the ingestion bridge subscribes to
    pub fn ingested() -> impl Iterator<Item = Topic> {
        Self::COLLECTORS.into_iter().chain(Self::TRAFFIC)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
