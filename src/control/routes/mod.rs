pub mod devices;
pub mod health;
pub mod rpc;
