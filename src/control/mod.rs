//! Control plane
//!
//! Lets other processes trigger scans and query the inventory over HTTP.
//!
//! ## Endpoints
//!
//! - `POST /api/v1/scan/net` - Scan networks (CIDR arguments)
//! - `POST /api/v1/scan/host` - Scan hosts
//! - `POST /api/v1/entries/request` - Republish the whole inventory
//! - `POST /api/v1/collectors/call` - Call selected collectors
//! - `GET /api/v1/devices` - Device summaries
//! - `GET /api/v1/devices/ip/:ip` - Device owning an IP
//! - `GET /api/v1/health` - Health check
//!
//! There is no authentication. Bind to a loopback address.

pub mod client;
#[cfg(feature = "control")]
pub mod error;
#[cfg(feature = "control")]
pub mod routes;
#[cfg(feature = "control")]
pub mod state;
pub mod types;

pub use client::ControlClient;
#[cfg(feature = "control")]
pub use error::{ControlError, ControlResult};
#[cfg(feature = "control")]
pub use state::ControlState;
pub use types::{RequestResponse, ResponseCode};

#[cfg(feature = "control")]
use axum::{
    Router,
    routing::{get, post},
};
#[cfg(feature = "control")]
use std::net::SocketAddr;
#[cfg(feature = "control")]
use tracing::info;

/// Build the control plane router
#[cfg(feature = "control")]
pub fn router(state: ControlState) -> Router {
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/scan/net", post(routes::rpc::scan_net))
        .route("/api/v1/scan/host", post(routes::rpc::scan_host))
        .route(
            "/api/v1/entries/request",
            post(routes::rpc::request_all_entries),
        )
        .route(
            "/api/v1/collectors/call",
            post(routes::rpc::call_collectors),
        )
        .route("/api/v1/devices", get(routes::devices::list_devices))
        .route(
            "/api/v1/devices/ip/:ip",
            get(routes::devices::get_device_by_ip),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Spawn the control server
///
/// Starts an Axum HTTP server in a background task and returns the address it listens on.
#[cfg(feature = "control")]
pub async fn spawn_control_server(
    bind_addr: SocketAddr,
    state: ControlState,
) -> anyhow::Result<SocketAddr> {
    info!("starting control server on {bind_addr}");

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("control server listening on {addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("control server error: {e}");
        }
    });

    Ok(addr)
}
