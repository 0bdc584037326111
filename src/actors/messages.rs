//! Message types for actor communication
//!
//! Commands are sent to one actor over its mpsc channel. Request/response commands carry a
//! oneshot sender for the reply. Shutdown commands carry an `ack` the actor fires just before
//! its loop exits, so the caller can wait for the task to actually stop.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// What a collector is asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum CommandKind {
    /// Arguments are hostnames or IPs
    ScanHost = 1,

    /// Arguments are networks in CIDR notation
    ScanNet = 2,
}

impl From<CommandKind> for u8 {
    fn from(kind: CommandKind) -> Self {
        kind as u8
    }
}

impl TryFrom<u8> for CommandKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CommandKind::ScanHost),
            2 => Ok(CommandKind::ScanNet),
            other => Err(format!("unknown command kind {other}")),
        }
    }
}

/// A command passed to collectors
///
/// Collectors must accept an empty command list, which means "run your regular scan".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    pub arguments: Vec<String>,
}

impl Command {
    pub fn scan_net(networks: Vec<String>) -> Self {
        Self {
            kind: CommandKind::ScanNet,
            arguments: networks,
        }
    }

    pub fn scan_host(hosts: Vec<String>) -> Self {
        Self {
            kind: CommandKind::ScanHost,
            arguments: hosts,
        }
    }
}

/// Name a collector registers under
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectorName(Cow<'static, str>);

impl CollectorName {
    /// Addresses every registered collector
    pub const ALL: CollectorName = CollectorName(Cow::Borrowed("all"));
    pub const ARP: CollectorName = CollectorName(Cow::Borrowed("arp"));
    pub const LLDP: CollectorName = CollectorName(Cow::Borrowed("lldp"));
    pub const NEIGHBOUR: CollectorName = CollectorName(Cow::Borrowed("neighbour"));
    pub const NMAP: CollectorName = CollectorName(Cow::Borrowed("nmap"));

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CollectorName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Commands that can be sent to the PublisherActor
#[derive(Debug)]
pub enum PublisherCommand {
    GetStats {
        respond_to: oneshot::Sender<PublisherStats>,
    },

    /// Stop draining and exit
    Shutdown { ack: oneshot::Sender<()> },
}

/// Publisher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublisherStats {
    /// Frames handed to the socket
    pub sent: u64,

    /// Frames dropped because the queue was full or the task was gone
    pub dropped: u64,

    /// Frames the socket failed to send
    pub failed: u64,
}

/// Commands that can be sent to the IngestActor
#[derive(Debug)]
pub enum IngestCommand {
    /// Run stale-device pruning immediately, replying with the number of devices removed
    PruneNow { respond_to: oneshot::Sender<usize> },

    GetStats {
        respond_to: oneshot::Sender<IngestStats>,
    },

    /// Stop consuming and exit
    Shutdown { ack: oneshot::Sender<()> },
}

/// Ingestion counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub received: u64,
    pub merged: u64,

    /// Payloads that failed to decode or wrap
    pub decode_errors: u64,

    /// Records the store refused (zero MAC, invalid MAC, no key)
    pub rejected: u64,

    pub alerts: u64,
    pub pruned: u64,

    /// Connection lists and data-use reports applied to the store
    pub traffic_updates: u64,
}

/// Commands that can be sent to the collector SchedulerActor
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Call every registered collector now, replying with how many were called
    TriggerNow {
        commands: Vec<Command>,
        respond_to: oneshot::Sender<usize>,
    },

    /// Change the heartbeat period
    UpdateInterval { interval_secs: u64 },

    Shutdown,
}
