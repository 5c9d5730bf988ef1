//! Liveness & readiness handlers.
//!
//! - GET /         -> plain-text banner
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> reports whether the storage gateway came up

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

pub const BANNER: &str = "Cloud Storage API Service is running!";

/// `GET /`
pub async fn index() -> &'static str {
    BANNER
}

/// `GET /healthz`
///
/// Always 200. Performs no I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// 200 with the backend name when the gateway is initialized, 503 with the
/// construction failure otherwise. Does not call the provider.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match state.services() {
        Ok(services) => (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ok".into(),
                backend: Some(services.gateway.backend()),
                reason: None,
            }),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                status: "degraded".into(),
                backend: None,
                reason: state.degraded_reason().map(str::to_string),
            }),
        ),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    backend: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}
