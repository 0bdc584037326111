//! Error types for the discovery engine
//!
//! Decode and transport failures are handled where they occur (logged, message dropped).
//! Store and settings errors are returned synchronously to the caller, which leaves the
//! inventory untouched.

/// Errors raised while building or validating a single device record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// MAC address is syntactically invalid
    #[error("invalid MAC address: '{0}'")]
    InvalidMac(String),

    /// A collector sighting arrived without the IP it was observed on
    #[error("{collector} entry missing IP field")]
    MissingIp { collector: &'static str },
}

/// Errors returned by [`crate::store::DeviceStore`] mutations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Record has neither a MAC address nor any IP address
    #[error("record has no MAC and no IP address, cannot be keyed")]
    Unkeyable,

    /// Record carries the all-zero MAC address
    #[error("record carries the all-zero MAC address")]
    ZeroMac,

    /// Record carries a malformed MAC address
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Errors turning a bus message into a device record
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Message arrived on a topic that carries no collector sightings
    #[error("unexpected topic '{0}'")]
    UnexpectedTopic(String),

    #[error("malformed payload: {0}")]
    Codec(#[from] serde_json::Error),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Pub/sub transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Socket could not be bound or connected
    #[error("unable to set up {role} socket: {reason}")]
    Setup { role: &'static str, reason: String },

    /// Sending a message failed
    #[error("send failed on topic '{topic}': {reason}")]
    Send { topic: String, reason: String },

    /// The other side of the bus went away
    #[error("bus closed")]
    Closed,

    /// Payload could not be encoded or decoded
    #[error("payload codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Collector settings validation errors
///
/// Settings are rejected as a whole: a single invalid plugin entry fails the object.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The settings document is not valid JSON or has the wrong shape
    #[error("unable to parse discovery settings: {0}")]
    Parse(#[from] serde_json::Error),

    /// Plugin entry names a collector type we do not know
    #[error("plugin #{index}: unknown collector type '{type_tag}'")]
    UnknownType { index: usize, type_tag: String },

    /// Plugin entry does not match the shape of its declared collector type
    #[error("plugin #{index} ({collector}): {reason}")]
    Malformed {
        index: usize,
        collector: String,
        reason: String,
    },

    /// Automatic scan interval outside of the allowed range
    #[error(
        "plugin #{index} ({collector}): autoInterval should be between {min} and {max} minutes but is {value}"
    )]
    IntervalOutOfRange {
        index: usize,
        collector: String,
        value: u64,
        min: u64,
        max: u64,
    },
}
