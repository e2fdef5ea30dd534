use crate::api::models::HealthResponse;
use crate::api::SharedState;
use axum::{extract::State, response::Json};
use chrono::Local;

/// Liveness plus a live reachability check. Always 200.
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "running".to_string(),
        thingsboard_accessible: state.probe.check().await,
        timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    })
}
