//! Actor-based discovery pipeline
//!
//! Each actor runs as an independent tokio task. It owns its state and is driven through a
//! cloneable handle over an mpsc command channel.
//!
//! ## Architecture Overview
//!
//! ```text
//!   SchedulerActor ──heartbeat / RPC──▶ collectors
//!                                           │ CollectorReporter
//!                                           ▼
//!                                     PublisherActor ──▶ bus
//!                                                         │ lldp / neigh / nmap / arp
//!                                                         ▼
//!                                     IngestActor ──merge──▶ DeviceStore
//!                                          │
//!                                          ├──▶ AlertSink (new devices)
//!                                          └──▶ on_merged (republish on the device topic)
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each actor has an mpsc command channel for control messages
//! 2. **Queues**: bounded mpsc queues carry bus frames into and out of the actors
//! 3. **Request/Response**: oneshot channels for queries and shutdown acknowledgements

pub mod collector;
pub mod ingest;
pub mod messages;
pub mod publisher;
