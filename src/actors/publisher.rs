//! PublisherActor - Drains the outbound queue onto the bus
//!
//! ## Backpressure
//!
//! Producers never wait. [`PublisherHandle::publish`] does a `try_send` on a bounded queue and
//! drops the frame when it is full. Fresh inventory beats complete inventory: a dropped device
//! update is superseded by the next merge of the same device anyway.
//!
//! ## Message Flow
//!
//! ```text
//! publish() ──try_send──▶ [bounded queue] ──▶ PublisherActor ──▶ PubSocket
//!                                                  ↑
//!                                      Commands (GetStats, Shutdown)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, instrument, trace, warn};

use super::messages::{PublisherCommand, PublisherStats};
use crate::error::TransportError;
use crate::transport::{BusMessage, Transport};

/// Default outbound queue capacity
pub const DEFAULT_CAPACITY: usize = 1000;

/// Default bound on the shutdown handshake
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub capacity: usize,
    pub shutdown_timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PublisherStats {
        PublisherStats {
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Actor owning the publishing socket
pub struct PublisherActor {
    transport: Arc<dyn Transport>,

    queue_rx: mpsc::Receiver<BusMessage>,

    command_rx: mpsc::Receiver<PublisherCommand>,

    counters: Arc<Counters>,
}

impl PublisherActor {
    /// Run the actor's main loop
    ///
    /// Exits early, without crashing anything, if the socket cannot be bound. Handles then
    /// drop everything they are given and their shutdown returns immediately.
    #[instrument(skip(self), name = "publisher")]
    pub async fn run(mut self) {
        let mut socket = match self.transport.bind_publisher().await {
            Ok(socket) => socket,
            Err(e) => {
                warn!("unable to set up publishing socket: {e}");
                return;
            }
        };

        info!("publisher started");

        loop {
            tokio::select! {
                biased;

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        PublisherCommand::GetStats { respond_to } => {
                            let _ = respond_to.send(self.counters.snapshot());
                        }
                        PublisherCommand::Shutdown { ack } => {
                            debug!("received shutdown command");
                            let _ = ack.send(());
                            break;
                        }
                    }
                }

                Some(message) = self.queue_rx.recv() => {
                    let topic = message.topic.clone();
                    match socket.send(message).await {
                        Ok(()) => {
                            self.counters.sent.fetch_add(1, Ordering::Relaxed);
                            trace!(%topic, "message sent");
                        }
                        Err(e) => {
                            self.counters.failed.fetch_add(1, Ordering::Relaxed);
                            error!(%topic, "publisher error: {e}");
                        }
                    }
                }

                else => {
                    debug!("all handles dropped, shutting down");
                    break;
                }
            }
        }

        debug!("publisher stopped");
    }
}

/// Handle for publishing through a PublisherActor
///
/// Cheap to clone. Every clone feeds the same queue.
#[derive(Clone)]
pub struct PublisherHandle {
    queue: mpsc::Sender<BusMessage>,

    sender: mpsc::Sender<PublisherCommand>,

    counters: Arc<Counters>,

    shutdown_timeout: Duration,
}

impl PublisherHandle {
    /// Build a handle and the actor behind it without starting the actor
    pub fn new(transport: Arc<dyn Transport>, config: PublisherConfig) -> (Self, PublisherActor) {
        let (queue_tx, queue_rx) = mpsc::channel(config.capacity.max(1));
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let counters = Arc::new(Counters::default());

        let actor = PublisherActor {
            transport,
            queue_rx,
            command_rx: cmd_rx,
            counters: counters.clone(),
        };

        let handle = Self {
            queue: queue_tx,
            sender: cmd_tx,
            counters,
            shutdown_timeout: config.shutdown_timeout,
        };

        (handle, actor)
    }

    /// Spawn a publisher on `transport`
    pub fn spawn(transport: Arc<dyn Transport>, config: PublisherConfig) -> Self {
        let (handle, actor) = Self::new(transport, config);
        tokio::spawn(actor.run());
        handle
    }

    /// A handle with no actor behind it, for when publishing is disabled
    ///
    /// Every publish is dropped and shutdown returns at once.
    pub fn disabled() -> Self {
        let (queue_tx, _) = mpsc::channel(1);
        let (cmd_tx, _) = mpsc::channel(1);

        Self {
            queue: queue_tx,
            sender: cmd_tx,
            counters: Arc::new(Counters::default()),
            shutdown_timeout: Duration::ZERO,
        }
    }

    /// Queue a frame without waiting
    ///
    /// Returns false if the frame was dropped.
    pub fn publish(&self, topic: impl Into<String>, payload: impl Into<Bytes>) -> bool {
        self.publish_message(BusMessage::new(topic, payload))
    }

    /// Queue `value` encoded as JSON
    pub fn publish_json<T: Serialize + ?Sized>(
        &self,
        topic: impl Into<String>,
        value: &T,
    ) -> Result<bool, TransportError> {
        Ok(self.publish_message(BusMessage::json(topic, value)?))
    }

    pub fn publish_message(&self, message: BusMessage) -> bool {
        match self.queue.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(topic = %message.topic, "publish queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(message)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(topic = %message.topic, "publisher not running, dropping message");
                false
            }
        }
    }

    /// Counters, read directly without a round trip to the actor
    pub fn stats(&self) -> PublisherStats {
        self.counters.snapshot()
    }

    /// Counters as seen by the actor, after every command queued before this one
    pub async fn query_stats(&self) -> Result<PublisherStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PublisherCommand::GetStats { respond_to: tx })
            .await
            .context("failed to send GetStats command")?;

        rx.await.context("failed to receive response")
    }

    /// Stop the publisher and wait for it to acknowledge
    ///
    /// Never blocks longer than the configured timeout. A missing or late acknowledgement is
    /// logged and shutdown proceeds.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .sender
            .send(PublisherCommand::Shutdown { ack: ack_tx })
            .await
            .is_err()
        {
            debug!("publisher already stopped");
            return;
        }

        match tokio::time::timeout(self.shutdown_timeout, ack_rx).await {
            Ok(Ok(())) => debug!("publisher shutdown acknowledged"),
            Ok(Err(_)) => warn!("publisher exited without acknowledging shutdown"),
            Err(_) => warn!(
                "timed out after {:?} waiting for publisher shutdown",
                self.shutdown_timeout
            ),
        }
    }
}
