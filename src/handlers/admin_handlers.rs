//! Admin surface. Every handler here sits behind the basic-auth middleware.

use crate::{
    errors::AppError,
    models::{
        entry::GuestEntry,
        reports::{ReconcileReport, Statistics, StatusReport},
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
    response::Html,
};
use serde_json::{Value, json};
use std::io::ErrorKind;

/// `GET /api/entries` — full projection, most recent first, unbounded.
pub async fn list_entries(
    State(state): State<AppState>,
) -> Result<Json<Vec<GuestEntry>>, AppError> {
    Ok(Json(state.service.entries().await?))
}

/// `DELETE /api/entries/{id}` — remove the object, then the record.
pub async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    state.service.delete_entry(id).await?;
    Ok(Json(json!({ "success": true })))
}

/// `GET /api/status` — independent store/bucket reachability checks.
pub async fn status(State(state): State<AppState>) -> Json<StatusReport> {
    Json(state.service.status().await)
}

/// `GET /api/statistics` — aggregate report, all-or-nothing.
pub async fn statistics(State(state): State<AppState>) -> Result<Json<Statistics>, AppError> {
    Ok(Json(state.service.statistics().await?))
}

/// `POST /api/reconcile` — run the orphan sweep.
pub async fn reconcile(State(state): State<AppState>) -> Result<Json<ReconcileReport>, AppError> {
    Ok(Json(state.service.reconcile().await?))
}

/// `GET /admin` — serve the static admin page.
pub async fn admin_page(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let path = std::path::Path::new(&state.config.public_dir).join("admin.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => Ok(Html(contents)),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            Err(AppError::not_found("admin page not installed"))
        }
        Err(err) => Err(AppError::internal(err)),
    }
}
