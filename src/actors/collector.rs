//! Collector registry and heartbeat scheduler
//!
//! Collectors (ARP table reader, LLDP neighbour reader, nmap runner, ...) live outside this
//! crate. They register a [`Collector`] under a name and get called with a list of
//! [`Command`]s, either empty on every heartbeat or specific when a scan is requested over the
//! control plane. Their sightings come back on the bus through a [`CollectorReporter`].
//!
//! ## Message Flow
//!
//! ```text
//! Heartbeat tick ──┐
//! TriggerNow ──────┼──▶ CollectorRegistry::call_collectors ──spawn──▶ Collector::collect (each)
//! Control plane ───┘                                                        │
//!                                                                           ▼
//!                                         CollectorReporter::report ──▶ PublisherHandle
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, instrument, trace, warn};

use super::messages::{CollectorName, Command, SchedulerCommand};
use super::publisher::PublisherHandle;
use crate::device::{CollectorRecord, Connection, DataUseReport};
use crate::error::TransportError;
use crate::transport::Topic;

/// Default heartbeat period
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(60);

/// A source of device sightings
///
/// `collect` runs in its own task. It must accept an empty command list, meaning "run your
/// regular scan", and may ignore commands it does not understand.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect(&self, commands: Vec<Command>);
}

/// Adapter turning a plain function into a [`Collector`]
pub struct FnCollector<F>(pub F);

#[async_trait]
impl<F> Collector for FnCollector<F>
where
    F: Fn(Vec<Command>) + Send + Sync,
{
    async fn collect(&self, commands: Vec<Command>) {
        (self.0)(commands)
    }
}

/// Named set of collectors
///
/// The lock is held only long enough to snapshot the handlers, so a slow collector never holds
/// up registration.
#[derive(Default)]
pub struct CollectorRegistry {
    collectors: RwLock<HashMap<CollectorName, Arc<dyn Collector>>>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `collector` under `name`, replacing any previous one
    pub fn register(&self, name: CollectorName, collector: Arc<dyn Collector>) {
        debug!(%name, "registering collector");
        self.collectors.write().insert(name, collector);
    }

    /// Returns false if nothing was registered under `name`
    pub fn unregister(&self, name: &CollectorName) -> bool {
        self.collectors.write().remove(name).is_some()
    }

    pub fn names(&self) -> Vec<CollectorName> {
        let mut names: Vec<_> = self.collectors.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.collectors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.read().is_empty()
    }

    /// Call every registered collector in its own task, fire-and-forget
    ///
    /// Does not wait for any collector. Returns how many were called. Must run inside a tokio
    /// runtime.
    pub fn call_collectors(&self, commands: &[Command]) -> usize {
        self.call_selected(&[CollectorName::ALL], commands)
    }

    /// Call the collectors named in `names`; [`CollectorName::ALL`] selects every one
    pub fn call_selected(&self, names: &[CollectorName], commands: &[Command]) -> usize {
        let everyone = names.is_empty() || names.contains(&CollectorName::ALL);
        let handlers: Vec<(CollectorName, Arc<dyn Collector>)> = self
            .collectors
            .read()
            .iter()
            .filter(|(name, _)| everyone || names.contains(name))
            .map(|(name, collector)| (name.clone(), collector.clone()))
            .collect();

        info!("calling {} collectors", handlers.len());

        for (name, collector) in &handlers {
            trace!(%name, "calling collector");
            let collector = collector.clone();
            let commands = commands.to_vec();
            tokio::spawn(async move { collector.collect(commands).await });
        }

        handlers.len()
    }
}

/// Actor calling every collector on a heartbeat
pub struct SchedulerActor {
    registry: Arc<CollectorRegistry>,

    command_rx: mpsc::Receiver<SchedulerCommand>,

    heartbeat: Duration,
}

impl SchedulerActor {
    #[instrument(skip(self), name = "scheduler")]
    pub async fn run(mut self) {
        debug!("starting collector scheduler");

        let mut ticker = Self::ticker(self.heartbeat);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.registry.call_collectors(&[]);
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        SchedulerCommand::TriggerNow { commands, respond_to } => {
                            debug!("received TriggerNow command");
                            let _ = respond_to.send(self.registry.call_collectors(&commands));
                        }

                        SchedulerCommand::UpdateInterval { interval_secs } => {
                            debug!("updating heartbeat to {interval_secs}s");
                            self.heartbeat = Duration::from_secs(interval_secs.max(1));
                            ticker = Self::ticker(self.heartbeat);
                        }

                        SchedulerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("collector scheduler stopped");
    }

    fn ticker(period: Duration) -> tokio::time::Interval {
        interval_at(Instant::now() + period, period)
    }
}

/// Handle for controlling a SchedulerActor
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    pub fn spawn(registry: Arc<CollectorRegistry>, heartbeat: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = SchedulerActor {
            registry,
            command_rx: cmd_rx,
            heartbeat: heartbeat.max(Duration::from_millis(1)),
        };

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Call every collector now, bypassing the heartbeat
    pub async fn trigger_now(&self, commands: Vec<Command>) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::TriggerNow {
                commands,
                respond_to: tx,
            })
            .await
            .context("failed to send TriggerNow command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        self.sender
            .send(SchedulerCommand::UpdateInterval { interval_secs })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(SchedulerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}

/// Publishes collector sightings on their topic
#[derive(Clone)]
pub struct CollectorReporter {
    publisher: PublisherHandle,
}

impl CollectorReporter {
    pub fn new(publisher: PublisherHandle) -> Self {
        Self { publisher }
    }

    /// Normalise and publish one sighting
    ///
    /// Returns false if the publisher dropped it.
    pub fn report(&self, mut record: CollectorRecord) -> Result<bool, TransportError> {
        record.normalize();

        match &record {
            CollectorRecord::Lldp(lldp) => self.publisher.publish_json(Topic::Lldp.as_str(), lldp),
            CollectorRecord::Neigh(neigh) => {
                self.publisher.publish_json(Topic::Neigh.as_str(), neigh)
            }
            CollectorRecord::Nmap(nmap) => self.publisher.publish_json(Topic::Nmap.as_str(), nmap),
            CollectorRecord::Arp(arp) => self.publisher.publish_json(Topic::Arp.as_str(), arp),
        }
    }

    /// Publish the full list of currently open connections
    pub fn report_connections(&self, connections: &[Connection]) -> Result<bool, TransportError> {
        self.publisher
            .publish_json(Topic::Connections.as_str(), connections)
    }

    /// Publish traffic counted for one IP since the previous report
    pub fn report_data_use(&self, report: &DataUseReport) -> Result<bool, TransportError> {
        self.publisher.publish_json(Topic::DataUse.as_str(), report)
    }
}
