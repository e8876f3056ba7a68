//! Error types for beqd
//!
//! Module-specific error types using thiserror. Every terminal error the
//! orchestrator produces is published to the status sensor before it is
//! returned, then mapped to an HTTP response here.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Main error type for beqd
#[derive(Error, Debug)]
pub enum Error {
    /// A referenced sensor does not exist in the store
    #[error("Sensor {0} not found")]
    SensorNotFound(String),

    /// Sensor value could not be interpreted (e.g. non-numeric year)
    #[error("Invalid sensor data: {0}")]
    InvalidInput(String),

    /// Primary load failed and substitution was disabled or exhausted
    #[error("Failed to load BEQ profile: {0}")]
    LoadFailed(String),

    /// Substitution requested but no catalogue could be fetched
    #[error("Failed to load BEQ profile (no catalogue for substitutions): {0}")]
    NoCatalog(String),

    /// Unload call against the DSP device failed
    #[error("Failed to unload BEQ profile: {0}")]
    UnloadFailed(String),

    /// Shared configuration/IO errors
    #[error(transparent)]
    Common(#[from] beqd_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using beqd Error
pub type Result<T> = std::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Error::SensorNotFound(_) => {
                (StatusCode::NOT_FOUND, "SENSOR_NOT_FOUND", self.to_string())
            }
            Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", self.to_string()),
            Error::LoadFailed(_) => (StatusCode::BAD_GATEWAY, "LOAD_FAILED", self.to_string()),
            Error::NoCatalog(_) => (StatusCode::BAD_GATEWAY, "NO_CATALOG", self.to_string()),
            Error::UnloadFailed(_) => {
                (StatusCode::BAD_GATEWAY, "UNLOAD_FAILED", self.to_string())
            }
            Error::Common(_) | Error::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                self.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
