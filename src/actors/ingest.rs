//! IngestActor - Turns collector messages into inventory updates
//!
//! The only consumer of collector sightings. Each message is decoded by topic, wrapped into a
//! minimal device record and merged into the store. Alerts returned by the merge go to the
//! alert sink, and the merged record goes to the `on_merged` callback (the daemon republishes it).
//!
//! Traffic topics bypass the merge: connection lists replace every device's connections and
//! data-use reports feed the data tracker of the device owning the reported IP.
//!
//! ## Message Flow
//!
//! ```text
//! SubSocket ──bridge──▶ [bounded inbound queue] ──▶ IngestActor ──merge_or_add──▶ DeviceStore
//!                                                     │    │
//!                                  prune timer ───────┘    ├──▶ AlertSink
//!                                  Commands (PruneNow,     └──▶ on_merged(record)
//!                                  GetStats, Shutdown)
//! ```
//!
//! Decode failures are logged and the message is dropped. They never stop the loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::TimeDelta;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, instrument, trace, warn};

use super::messages::{IngestCommand, IngestStats};
use crate::alerts::AlertSink;
use crate::device::{
    Arp, CollectorRecord, Connection, DataUseReport, DeviceRecord, Lldp, Neigh, Nmap,
};
use crate::error::DecodeError;
use crate::store::DeviceStore;
use crate::transport::{BusMessage, Topic, Transport};

/// Called with a clone of every merged record
pub type MergedCallback = Arc<dyn Fn(DeviceRecord) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub queue_capacity: usize,

    /// How often stale devices are pruned
    pub prune_interval: Duration,

    /// Devices not updated for this long are pruned
    pub stale_after: TimeDelta,

    pub shutdown_timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            prune_interval: Duration::from_secs(60 * 60),
            stale_after: TimeDelta::hours(24),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Decode a collector payload and wrap it into a device record
pub fn decode_sighting(topic: Topic, payload: &[u8]) -> Result<DeviceRecord, DecodeError> {
    let sighting = match topic {
        Topic::Lldp => CollectorRecord::Lldp(serde_json::from_slice::<Lldp>(payload)?),
        Topic::Neigh => CollectorRecord::Neigh(serde_json::from_slice::<Neigh>(payload)?),
        Topic::Nmap => CollectorRecord::Nmap(serde_json::from_slice::<Nmap>(payload)?),
        Topic::Arp => CollectorRecord::Arp(serde_json::from_slice::<Arp>(payload)?),
        other => return Err(DecodeError::UnexpectedTopic(other.to_string())),
    };

    Ok(sighting.into_device_record()?)
}

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Sighting(DeviceRecord),
    Connections(Vec<Connection>),
    DataUse(DataUseReport),
}

/// Decode any message the bridge forwards
pub fn decode_inbound(topic: Topic, payload: &[u8]) -> Result<Inbound, DecodeError> {
    match topic {
        Topic::Connections => Ok(Inbound::Connections(serde_json::from_slice(payload)?)),
        Topic::DataUse => Ok(Inbound::DataUse(serde_json::from_slice(payload)?)),
        other => decode_sighting(other, payload).map(Inbound::Sighting),
    }
}

/// Actor consuming the inbound queue
pub struct IngestActor {
    store: Arc<DeviceStore>,

    alerts: Arc<dyn AlertSink>,

    on_merged: Option<MergedCallback>,

    inbound_rx: mpsc::Receiver<BusMessage>,

    command_rx: mpsc::Receiver<IngestCommand>,

    config: IngestConfig,

    stats: IngestStats,
}

impl IngestActor {
    #[instrument(skip(self), name = "ingest")]
    pub async fn run(mut self) {
        info!("ingestion started");

        let period = self.config.prune_interval.max(Duration::from_millis(1));
        let mut prune_ticker = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                biased;

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        IngestCommand::PruneNow { respond_to } => {
                            self.drain_queued();
                            let _ = respond_to.send(self.prune());
                        }
                        IngestCommand::GetStats { respond_to } => {
                            self.drain_queued();
                            let _ = respond_to.send(self.stats);
                        }
                        IngestCommand::Shutdown { ack } => {
                            debug!("received shutdown command");
                            let _ = ack.send(());
                            break;
                        }
                    }
                }

                Some(message) = self.inbound_rx.recv() => {
                    self.handle_message(message);
                }

                _ = prune_ticker.tick() => {
                    self.prune();
                }

                else => {
                    debug!("all handles dropped, shutting down");
                    break;
                }
            }
        }

        debug!("ingestion stopped");
    }

    /// Handle the messages already queued, so replies reflect everything submitted before them
    fn drain_queued(&mut self) {
        for _ in 0..self.inbound_rx.len() {
            match self.inbound_rx.try_recv() {
                Ok(message) => self.handle_message(message),
                Err(_) => break,
            }
        }
    }

    fn handle_message(&mut self, message: BusMessage) {
        self.stats.received += 1;
        trace!(topic = %message.topic, "received message");

        let inbound = match Topic::parse(&message.topic)
            .ok_or_else(|| DecodeError::UnexpectedTopic(message.topic.clone()))
            .and_then(|topic| decode_inbound(topic, &message.payload))
        {
            Ok(inbound) => inbound,
            Err(e) => {
                self.stats.decode_errors += 1;
                warn!(topic = %message.topic, "couldn't process discovery message: {e}");
                return;
            }
        };

        match inbound {
            Inbound::Sighting(record) => self.merge(record, &message.topic),
            Inbound::Connections(connections) => {
                let received = connections.len();
                let attached = self.store.merge_connections(connections);
                self.stats.traffic_updates += 1;
                trace!(received, attached, "replaced device connections");
            }
            Inbound::DataUse(report) => {
                if self.store.incr_data(&report.ip, report.amount) {
                    self.stats.traffic_updates += 1;
                } else {
                    self.stats.rejected += 1;
                    debug!(ip = %report.ip, "data use for unknown device");
                }
            }
        }
    }

    fn merge(&mut self, record: DeviceRecord, topic: &str) {
        match self.store.merge_or_add(record) {
            Ok(outcome) => {
                self.stats.merged += 1;
                if let Some(alert) = outcome.alert {
                    self.stats.alerts += 1;
                    info!(
                        mac = alert.param("macAddress").unwrap_or_default(),
                        ips = alert.param("ips").unwrap_or_default(),
                        "new device discovered"
                    );
                    self.alerts.send(alert);
                }
                if let Some(on_merged) = &self.on_merged {
                    on_merged(outcome.record);
                }
            }
            Err(e) => {
                self.stats.rejected += 1;
                debug!(%topic, "record not merged: {e}");
            }
        }
    }

    fn prune(&mut self) -> usize {
        let removed = self
            .store
            .prune(&[self.store.last_update_older_than(self.config.stale_after)])
            .len();
        if removed > 0 {
            info!("pruned {removed} stale devices");
        }
        self.stats.pruned += removed as u64;
        removed
    }
}

/// Handle for feeding and controlling an IngestActor
#[derive(Clone)]
pub struct IngestHandle {
    inbound: mpsc::Sender<BusMessage>,

    sender: mpsc::Sender<IngestCommand>,

    shutdown_timeout: Duration,
}

impl IngestHandle {
    pub fn spawn(
        store: Arc<DeviceStore>,
        alerts: Arc<dyn AlertSink>,
        on_merged: Option<MergedCallback>,
        config: IngestConfig,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let shutdown_timeout = config.shutdown_timeout;

        let actor = IngestActor {
            store,
            alerts,
            on_merged,
            inbound_rx,
            command_rx: cmd_rx,
            config,
            stats: IngestStats::default(),
        };

        tokio::spawn(actor.run());

        Self {
            inbound: inbound_tx,
            sender: cmd_tx,
            shutdown_timeout,
        }
    }

    /// Queue a message, waiting for room in the inbound queue
    pub async fn submit(&self, message: BusMessage) -> Result<()> {
        self.inbound
            .send(message)
            .await
            .context("ingestion is not running")
    }

    /// Subscribe on `transport` and forward collector and traffic topics into the inbound queue
    ///
    /// If the subscription cannot be set up the task logs a warning and exits, leaving the
    /// engine running without ingestion.
    pub fn bridge(&self, transport: Arc<dyn Transport>) -> JoinHandle<()> {
        let inbound = self.inbound.clone();
        let prefixes: Vec<String> = Topic::ingested()
            .map(|topic| topic.as_str().to_string())
            .collect();

        tokio::spawn(async move {
            let mut socket = match transport.subscribe(&prefixes).await {
                Ok(socket) => socket,
                Err(e) => {
                    warn!("unable to set up subscription socket: {e}");
                    return;
                }
            };

            loop {
                let message = match socket.recv().await {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("subscription ended: {e}");
                        return;
                    }
                };
                if inbound.send(message).await.is_err() {
                    debug!("ingestion stopped, closing subscription");
                    return;
                }
            }
        })
    }

    /// Prune stale devices now, returning how many were removed
    pub async fn prune_now(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(IngestCommand::PruneNow { respond_to: tx })
            .await
            .context("failed to send PruneNow command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn stats(&self) -> Result<IngestStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(IngestCommand::GetStats { respond_to: tx })
            .await
            .context("failed to send GetStats command")?;

        rx.await.context("failed to receive response")
    }

    /// Stop ingestion and wait, bounded, for the actor to acknowledge
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .sender
            .send(IngestCommand::Shutdown { ack: ack_tx })
            .await
            .is_err()
        {
            debug!("ingestion already stopped");
            return;
        }

        match tokio::time::timeout(self.shutdown_timeout, ack_rx).await {
            Ok(Ok(())) => debug!("ingestion shutdown acknowledged"),
            Ok(Err(_)) => warn!("ingestion exited without acknowledging shutdown"),
            Err(_) => warn!(
                "timed out after {:?} waiting for ingestion shutdown",
                self.shutdown_timeout
            ),
        }
    }
}
