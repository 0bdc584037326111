//! Scan and republish requests
//!
//! These answer with a [`ResponseCode`] in the body rather than an HTTP error, so callers get
//! the same response shape whatever happens.

use std::net::IpAddr;

use axum::{Json, extract::State};
use tracing::{debug, info, instrument, warn};

use crate::actors::messages::Command;
use crate::control::{
    state::ControlState,
    types::{
        CallCollectorsRequest, CallCollectorsResponse, RequestResponse, ResponseCode,
        ScanHostRequest, ScanNetRequest,
    },
};
use crate::transport::topics::DEVICE_TOPIC;

/// True for `address/prefix` with a prefix that fits the address family
pub fn is_cidr(net: &str) -> bool {
    let Some((address, prefix)) = net.split_once('/') else {
        return false;
    };
    let Ok(prefix) = prefix.parse::<u8>() else {
        return false;
    };

    match address.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => prefix <= 32,
        Ok(IpAddr::V6(_)) => prefix <= 128,
        Err(_) => false,
    }
}

fn is_host(host: &str) -> bool {
    !host.is_empty() && !host.chars().any(char::is_whitespace)
}

async fn trigger(state: &ControlState, command: Command) -> ResponseCode {
    match state.scheduler.trigger_now(vec![command]).await {
        Ok(called) => {
            debug!(called, "collectors triggered");
            ResponseCode::Ok
        }
        Err(e) => {
            warn!("unable to trigger collectors: {e}");
            ResponseCode::Error
        }
    }
}

/// POST /api/v1/scan/net
#[instrument(skip(state))]
pub async fn scan_net(
    State(state): State<ControlState>,
    Json(request): Json<ScanNetRequest>,
) -> Json<RequestResponse> {
    if request.net.is_empty() || !request.net.iter().all(|net| is_cidr(net)) {
        info!("rejecting scan request");
        return Json(RequestResponse::new(ResponseCode::InvalidRequest));
    }

    let result = trigger(&state, Command::scan_net(request.net)).await;
    Json(RequestResponse::new(result))
}

/// POST /api/v1/scan/host
#[instrument(skip(state))]
pub async fn scan_host(
    State(state): State<ControlState>,
    Json(request): Json<ScanHostRequest>,
) -> Json<RequestResponse> {
    if request.host.is_empty() || !request.host.iter().all(|host| is_host(host)) {
        info!("rejecting scan request");
        return Json(RequestResponse::new(ResponseCode::InvalidRequest));
    }

    let result = trigger(&state, Command::scan_host(request.host)).await;
    Json(RequestResponse::new(result))
}

/// POST /api/v1/entries/request
///
/// Republishes every record in the inventory on the device topic.
#[instrument(skip(state))]
pub async fn request_all_entries(State(state): State<ControlState>) -> Json<RequestResponse> {
    let published = state.store.apply(&[], |records| {
        records.iter().try_fold(0_usize, |queued, record| {
            state
                .publisher
                .publish_json(DEVICE_TOPIC, record)
                .map(|accepted| queued + usize::from(accepted))
        })
    });

    let result = match published {
        Ok(queued) => {
            debug!(queued, "inventory republished");
            ResponseCode::Ok
        }
        Err(e) => {
            warn!("unable to republish inventory: {e}");
            ResponseCode::Error
        }
    };

    Json(RequestResponse::new(result))
}

/// POST /api/v1/collectors/call
#[instrument(skip(state))]
pub async fn call_collectors(
    State(state): State<ControlState>,
    Json(request): Json<CallCollectorsRequest>,
) -> Json<CallCollectorsResponse> {
    let called = state
        .registry
        .call_selected(&request.collectors, &request.commands);

    Json(CallCollectorsResponse {
        result: ResponseCode::Ok,
        called,
    })
}
