//! In-process bus on a tokio broadcast channel

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use super::{BusMessage, PubSocket, SubSocket, Transport};
use crate::error::TransportError;

/// Broadcast bus shared by every socket created from it
///
/// Slow subscribers lag and lose the oldest frames, like a PUB/SUB socket with a high-water
/// mark. Cloning yields another handle on the same bus.
#[derive(Debug, Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<BusMessage>,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl Transport for LocalBus {
    async fn bind_publisher(&self) -> Result<Box<dyn PubSocket>, TransportError> {
        Ok(Box::new(LocalPub {
            sender: self.sender.clone(),
        }))
    }

    async fn subscribe(&self, prefixes: &[String]) -> Result<Box<dyn SubSocket>, TransportError> {
        Ok(Box::new(LocalSub {
            receiver: self.sender.subscribe(),
            prefixes: prefixes.to_vec(),
        }))
    }
}

struct LocalPub {
    sender: broadcast::Sender<BusMessage>,
}

#[async_trait]
impl PubSocket for LocalPub {
    async fn send(&mut self, message: BusMessage) -> Result<(), TransportError> {
        match self.sender.send(message) {
            Ok(receivers) => trace!("message sent to {receivers} subscribers"),
            // no subscriber is not an error for a PUB socket
            Err(_) => trace!("no subscribers for message"),
        }
        Ok(())
    }
}

struct LocalSub {
    receiver: broadcast::Receiver<BusMessage>,
    prefixes: Vec<String>,
}

impl LocalSub {
    fn wants(&self, topic: &str) -> bool {
        self.prefixes.is_empty() || self.prefixes.iter().any(|p| topic.starts_with(p.as_str()))
    }
}

#[async_trait]
impl SubSocket for LocalSub {
    async fn recv(&mut self) -> Result<BusMessage, TransportError> {
        loop {
            match self.receiver.recv().await {
                Ok(message) if self.wants(&message.topic) => return Ok(message),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("subscriber lagged, {skipped} messages lost");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(TransportError::Closed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::topics::{DEVICE_TOPIC, NEIGH_TOPIC};
    use std::time::Duration;

    #[tokio::test]
    async fn test_subscription_filters_by_prefix() {
        let bus = LocalBus::new(16);
        let mut sub = bus
            .subscribe(&["arista:discovery:neigh".to_string()])
            .await
            .unwrap();
        let mut publisher = bus.bind_publisher().await.unwrap();

        publisher
            .send(BusMessage::new(DEVICE_TOPIC, "skip"))
            .await
            .unwrap();
        publisher
            .send(BusMessage::new(NEIGH_TOPIC, "keep"))
            .await
            .unwrap();

        let message = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.topic, NEIGH_TOPIC);
        assert_eq!(&message.payload[..], b"keep");
    }

    #[tokio::test]
    async fn test_send_without_subscribers_succeeds() {
        let bus = LocalBus::new(4);
        let mut publisher = bus.bind_publisher().await.unwrap();
        assert!(publisher.send(BusMessage::new(DEVICE_TOPIC, "x")).await.is_ok());
        assert_eq!(bus.subscriber_count(), 0);
    }
}
