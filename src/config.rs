use std::net::SocketAddr;
use std::time::Duration;

use chrono::TimeDelta;
use serde::Deserialize;
use tracing::{info, trace};

use crate::actors::ingest::IngestConfig;
use crate::actors::messages::CollectorName;
use crate::actors::publisher::PublisherConfig;
use crate::error::SettingsError;

/// Shortest allowed automatic scan interval, in minutes (1 hour)
pub const MIN_AUTO_INTERVAL: u64 = 60;

/// Longest allowed automatic scan interval, in minutes (365 days)
pub const MAX_AUTO_INTERVAL: u64 = 365 * 24 * 60;

const CONTROL_ADDR_ENV: &str = "DISCOVERD_CONTROL_ADDR";

const DEFAULT_CONTROL_ADDR: &str = "127.0.0.1:5563";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub publisher: PublisherSection,
    pub ingest: IngestSection,
    pub collectors: CollectorsSection,
    pub tracker: TrackerSection,
    pub control: ControlSection,

    /// Discovery settings object, validated with [`validate_discovery_settings`] on load
    pub discovery: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublisherSection {
    pub capacity: usize,
    pub shutdown_timeout_secs: u64,
}

impl Default for PublisherSection {
    fn default() -> Self {
        Self {
            capacity: 1000,
            shutdown_timeout_secs: 5,
        }
    }
}

impl PublisherSection {
    pub fn to_publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            capacity: self.capacity,
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    pub queue_capacity: usize,
    pub prune_interval_secs: u64,
    pub stale_after_hours: i64,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            prune_interval_secs: 3600,
            stale_after_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectorsSection {
    pub heartbeat_secs: u64,
}

impl Default for CollectorsSection {
    fn default() -> Self {
        Self { heartbeat_secs: 60 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerSection {
    pub bin_interval_mins: i64,
    pub max_track_hours: i64,
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            bin_interval_mins: 30,
            max_track_hours: 24,
        }
    }
}

impl TrackerSection {
    pub fn bin_interval(&self) -> anyhow::Result<TimeDelta> {
        time_setting("tracker.bin_interval_mins", self.bin_interval_mins, TimeDelta::try_minutes)
    }

    pub fn max_track(&self) -> anyhow::Result<TimeDelta> {
        time_setting("tracker.max_track_hours", self.max_track_hours, TimeDelta::try_hours)
    }
}

/// Convert a configured amount of time, rejecting negative and unrepresentable values
fn time_setting(
    name: &str,
    value: i64,
    convert: fn(i64) -> Option<TimeDelta>,
) -> anyhow::Result<TimeDelta> {
    if value < 0 {
        anyhow::bail!("{name} must not be negative, got {value}");
    }
    convert(value).ok_or_else(|| anyhow::anyhow!("{name} is out of range: {value}"))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlSection {
    pub enabled: bool,
    pub bind_addr: SocketAddr,
}

impl Default for ControlSection {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: default_control_addr(),
        }
    }
}

fn default_control_addr() -> SocketAddr {
    let fallback = SocketAddr::from(([127, 0, 0, 1], 5563));
    std::env::var(CONTROL_ADDR_ENV)
        .unwrap_or_else(|_| DEFAULT_CONTROL_ADDR.to_string())
        .parse()
        .unwrap_or(fallback)
}

impl Config {
    pub fn ingest_config(&self) -> anyhow::Result<IngestConfig> {
        Ok(IngestConfig {
            queue_capacity: self.ingest.queue_capacity,
            prune_interval: Duration::from_secs(self.ingest.prune_interval_secs),
            stale_after: time_setting(
                "ingest.stale_after_hours",
                self.ingest.stale_after_hours,
                TimeDelta::try_hours,
            )?,
            shutdown_timeout: Duration::from_secs(self.publisher.shutdown_timeout_secs),
        })
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.collectors.heartbeat_secs)
    }

    /// The validated `discovery` section, if there is one
    pub fn discovery_settings(&self) -> Result<Option<DiscoverySettings>, SettingsError> {
        self.discovery
            .as_ref()
            .map(|discovery| validate_discovery_settings(&discovery.to_string()))
            .transpose()
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))?;

    config.discovery_settings()?;
    config.ingest_config()?;
    config.tracker.bin_interval()?;
    config.tracker.max_track()?;

    trace!("loaded config: {config:?}");
    Ok(config)
}

/// Settings of one collector plugin
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectorSettings {
    #[serde(rename = "type")]
    pub collector: CollectorName,

    pub enabled: bool,

    /// Minutes between automatic scans
    pub auto_interval: u64,
}

/// The whole discovery settings object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverySettings {
    pub enabled: bool,
    pub plugins: Vec<CollectorSettings>,
}

#[derive(Deserialize)]
struct RawDiscoverySettings {
    #[serde(default)]
    enabled: bool,

    #[serde(default)]
    plugins: Vec<serde_json::Value>,
}

const KNOWN_COLLECTORS: [CollectorName; 4] = [
    CollectorName::ARP,
    CollectorName::LLDP,
    CollectorName::NEIGHBOUR,
    CollectorName::NMAP,
];

/// Parse and validate a discovery settings document
///
/// Every plugin must name a known collector type and carry an `autoInterval` between
/// [`MIN_AUTO_INTERVAL`] and [`MAX_AUTO_INTERVAL`] minutes. One bad plugin rejects the whole
/// document.
pub fn validate_discovery_settings(document: &str) -> Result<DiscoverySettings, SettingsError> {
    let raw: RawDiscoverySettings = serde_json::from_str(document)?;

    let plugins = raw
        .plugins
        .into_iter()
        .enumerate()
        .map(|(index, plugin)| validate_collector(index, plugin))
        .collect::<Result<Vec<_>, _>>()
        .inspect_err(|e| info!("rejecting discovery settings: {e}"))?;

    Ok(DiscoverySettings {
        enabled: raw.enabled,
        plugins,
    })
}

fn validate_collector(
    index: usize,
    plugin: serde_json::Value,
) -> Result<CollectorSettings, SettingsError> {
    let type_tag = plugin
        .get("type")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();

    if !KNOWN_COLLECTORS.iter().any(|known| known.as_str() == type_tag) {
        return Err(SettingsError::UnknownType { index, type_tag });
    }

    let settings: CollectorSettings =
        serde_json::from_value(plugin).map_err(|e| SettingsError::Malformed {
            index,
            collector: type_tag.clone(),
            reason: e.to_string(),
        })?;

    if !(MIN_AUTO_INTERVAL..=MAX_AUTO_INTERVAL).contains(&settings.auto_interval) {
        return Err(SettingsError::IntervalOutOfRange {
            index,
            collector: type_tag,
            value: settings.auto_interval,
            min: MIN_AUTO_INTERVAL,
            max: MAX_AUTO_INTERVAL,
        });
    }

    Ok(settings)
}
