//! Health check handlers.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tempo_queue::{HealthCheck, HealthStatus};
use tracing::warn;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Ready while the key/value store answers. Queue degradation is reported
/// but does not take the instance out of rotation.
pub async fn ready(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadyResponse>) {
    let check = HealthCheck::probe(state.kv.as_ref(), &state.queue_metrics).await;
    let (code, status, reason) = match check.status {
        HealthStatus::Healthy => (StatusCode::OK, "ready", None),
        HealthStatus::Degraded { reason } => (StatusCode::OK, "degraded", Some(reason)),
        HealthStatus::Unhealthy { reason } => {
            warn!(reason = %reason, "Readiness probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                Some("key/value store unreachable".to_string()),
            )
        }
    };
    (code, Json(ReadyResponse { status, reason }))
}
