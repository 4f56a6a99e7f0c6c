use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub accelerator_available: bool,
    pub timestamp: DateTime<Utc>,
}

/// Never fails and never consults the service mode, so degraded instances
/// stay visible to orchestration.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        accelerator_available: state.service.accelerator_available,
        timestamp: Utc::now(),
    };

    (StatusCode::OK, Json(response))
}

#[cfg(test)]
mod tests {
    use axum::{Router, body::Body, http::Request, routing::get};
    use tower::ServiceExt;

    use super::super::testutil::{body_json, state_with_mode};
    use super::*;
    use crate::ServiceMode;

    async fn get_health(mode: ServiceMode) -> (StatusCode, serde_json::Value) {
        let app = Router::new()
            .route("/health", get(health_check))
            .with_state(state_with_mode(mode));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        (status, body_json(response).await)
    }

    #[tokio::test]
    async fn reports_ok_in_mock_mode() {
        let (status, json) = get_health(ServiceMode::Mock).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["accelerator_available"], false);
    }

    #[tokio::test]
    async fn reports_ok_even_after_a_load_failure() {
        let (status, json) = get_health(ServiceMode::ModelLoadFailed).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert!(json["accelerator_available"].is_boolean());
    }
}
