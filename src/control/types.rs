//! Request and response bodies of the control plane
//!
//! Shared by the server and [`super::client::ControlClient`] so both ends agree on the wire
//! format.

use serde::{Deserialize, Serialize};

use crate::actors::messages::{CollectorName, Command};

/// Outcome of a control request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseCode {
    Unknown,
    Ok,
    Error,
    InvalidRequest,
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ResponseCode::Unknown => "UNKNOWN",
            ResponseCode::Ok => "OK",
            ResponseCode::Error => "ERROR",
            ResponseCode::InvalidRequest => "INVALID_REQUEST",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestResponse {
    pub result: ResponseCode,
}

impl RequestResponse {
    pub fn new(result: ResponseCode) -> Self {
        Self { result }
    }
}

/// Body of `POST /api/v1/scan/net`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanNetRequest {
    /// Networks in CIDR notation
    #[serde(default)]
    pub net: Vec<String>,
}

/// Body of `POST /api/v1/scan/host`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanHostRequest {
    /// Hostnames or IP addresses
    #[serde(default)]
    pub host: Vec<String>,
}

/// Body of `POST /api/v1/collectors/call`
///
/// An empty collector list, or one containing `all`, addresses every registered collector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallCollectorsRequest {
    #[serde(default)]
    pub collectors: Vec<CollectorName>,

    #[serde(default)]
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallCollectorsResponse {
    pub result: ResponseCode,

    /// Number of collectors invoked
    pub called: usize,
}

/// Query string of `GET /api/v1/devices`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceQuery {
    /// Only return devices updated within this many seconds
    pub updated_within_secs: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub devices: usize,
    pub collectors: Vec<CollectorName>,
}
