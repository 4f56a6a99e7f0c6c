use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

pub mod diagnose;
pub mod health;
pub mod training;

pub use diagnose::{BoundingBox, DiagnosisResponse, diagnose};
pub use health::{HealthResponse, health_check};
pub use training::stream_training;

/// Error body shape the frontend expects: `{"detail": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

pub(crate) fn error(status: StatusCode, detail: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            detail: detail.to_string(),
        }),
    )
}
