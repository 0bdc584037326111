//! Control plane error types and conversions

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

pub type ControlResult<T> = Result<T, ControlError>;

/// HTTP-level failures of the control plane
///
/// RPC outcomes (`OK`, `ERROR`, `INVALID_REQUEST`) travel in the response body as a
/// [`super::types::ResponseCode`]. This type covers everything that is not an RPC outcome.
#[derive(Debug)]
pub enum ControlError {
    InvalidRequest(String),

    NotFound(String),

    Internal(String),
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ControlError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ControlError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ControlError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(json!({ "error": error_message }))).into_response()
    }
}

impl From<anyhow::Error> for ControlError {
    fn from(err: anyhow::Error) -> Self {
        ControlError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for ControlError {
    fn from(err: serde_json::Error) -> Self {
        ControlError::Internal(err.to_string())
    }
}
