//! Liveness endpoint.

use crate::state::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    minio: bool,
}

/// `GET /health`
///
/// Always 200; reports the current store-health gate without performing
/// any I/O of its own.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        minio: state.service.health().is_healthy(),
    })
}
