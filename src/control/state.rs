//! Shared state handed to every control plane handler

use std::sync::Arc;

use crate::actors::collector::{CollectorRegistry, SchedulerHandle};
use crate::actors::publisher::PublisherHandle;
use crate::store::DeviceStore;

#[derive(Clone)]
pub struct ControlState {
    pub store: Arc<DeviceStore>,

    /// Named collectors, for targeted calls
    pub registry: Arc<CollectorRegistry>,

    /// Scheduler running the heartbeat, for scan requests
    pub scheduler: SchedulerHandle,

    /// Used to republish the inventory on request
    pub publisher: PublisherHandle,
}

impl ControlState {
    pub fn new(
        store: Arc<DeviceStore>,
        registry: Arc<CollectorRegistry>,
        scheduler: SchedulerHandle,
        publisher: PublisherHandle,
    ) -> Self {
        Self {
            store,
            registry,
            scheduler,
            publisher,
        }
    }
}
