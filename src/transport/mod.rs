//! Publish/subscribe transport
//!
//! The engine talks to the bus through three small traits so the socket implementation can be
//! swapped. [`LocalBus`] is the in-process implementation used by the daemon and in tests.
//!
//! ```text
//! PublisherActor ──send──▶ PubSocket ──▶ bus ──▶ SubSocket ──recv──▶ ingest bridge
//! ```
//!
//! Payloads are JSON. The transport itself treats them as opaque bytes.

pub mod local;
pub mod topics;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::TransportError;

pub use local::LocalBus;
pub use topics::Topic;

/// One `(topic, payload)` frame on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Encode `value` as the JSON payload of a new message
    pub fn json<T: Serialize + ?Sized>(
        topic: impl Into<String>,
        value: &T,
    ) -> Result<Self, TransportError> {
        Ok(Self::new(topic, serde_json::to_vec(value)?))
    }

    /// Decode the JSON payload
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// Factory for publishing and subscribing sockets
#[async_trait]
pub trait Transport: Send + Sync {
    async fn bind_publisher(&self) -> Result<Box<dyn PubSocket>, TransportError>;

    /// Subscribe to every topic starting with one of `prefixes`
    ///
    /// An empty prefix list subscribes to everything.
    async fn subscribe(&self, prefixes: &[String]) -> Result<Box<dyn SubSocket>, TransportError>;
}

#[async_trait]
pub trait PubSocket: Send {
    async fn send(&mut self, message: BusMessage) -> Result<(), TransportError>;
}

#[async_trait]
pub trait SubSocket: Send {
    /// Wait for the next message matching the subscription
    async fn recv(&mut self) -> Result<BusMessage, TransportError>;
}
