pub mod actors;
pub mod alerts;
pub mod config;
pub mod control;
pub mod device;
pub mod error;
pub mod store;
pub mod tracker;
pub mod transport;
