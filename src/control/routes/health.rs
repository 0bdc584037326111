//! Health check endpoint

use axum::{Json, extract::State};

use crate::control::{state::ControlState, types::HealthResponse};

/// GET /api/v1/health
pub async fn health_check(State(state): State<ControlState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        devices: state.store.len(),
        collectors: state.registry.names(),
    })
}
