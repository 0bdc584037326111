//! Inventory query endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::TimeDelta;

use crate::control::{
    error::{ControlError, ControlResult},
    state::ControlState,
    types::DeviceQuery,
};
use crate::device::DeviceRecord;
use crate::store::{DeviceSummary, ListPredicate};

/// GET /api/v1/devices
///
/// Summaries of every device, optionally limited to those updated within
/// `updated_within_secs` seconds.
pub async fn list_devices(
    State(state): State<ControlState>,
    Query(query): Query<DeviceQuery>,
) -> ControlResult<Json<Vec<DeviceSummary>>> {
    let mut predicates: Vec<ListPredicate> = Vec::new();

    if let Some(secs) = query.updated_within_secs {
        let period = TimeDelta::try_seconds(secs)
            .filter(|period| *period >= TimeDelta::zero())
            .ok_or_else(|| {
                ControlError::InvalidRequest(format!("invalid updated_within_secs: {secs}"))
            })?;
        predicates.push(state.store.updated_within(period));
    }

    Ok(Json(state.store.summaries(&predicates)))
}

/// GET /api/v1/devices/ip/:ip
pub async fn get_device_by_ip(
    State(state): State<ControlState>,
    Path(ip): Path<String>,
) -> ControlResult<Json<DeviceRecord>> {
    state
        .store
        .get_by_ip(&ip)
        .map(Json)
        .ok_or_else(|| ControlError::NotFound(format!("no device with IP {ip}")))
}
