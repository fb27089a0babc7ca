//! Route table for the guestbook service.
//!
//! ## Structure
//! - **Public endpoints**
//!   - `POST /api/upload` — submit an entry (body-limited multipart)
//!   - `GET  /api/media/{filename}` — stream a stored object
//!   - `GET  /api/guests` — gallery projection, media URLs only
//!   - `GET  /health` — liveness plus the store-health gate
//!
//! - **Admin endpoints** (HTTP Basic, single configured pair)
//!   - `GET    /api/entries` — full entry list
//!   - `DELETE /api/entries/{id}` — delete entry and its object
//!   - `GET    /api/status` — independent reachability checks
//!   - `GET    /api/statistics` — aggregate statistics
//!   - `POST   /api/reconcile` — orphan sweep
//!   - `GET    /admin` — static admin page

use crate::{
    auth::require_admin,
    handlers::{
        admin_handlers::{admin_page, delete_entry, list_entries, reconcile, statistics, status},
        gallery_handlers::{get_media, public_gallery},
        health_handlers::health,
        upload_handlers::upload,
    },
    services::guestbook::MAX_UPLOAD_BYTES,
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
};

/// Request-body ceiling for the upload route: the payload cap plus room
/// for multipart framing and the text fields.
const UPLOAD_BODY_LIMIT: usize = MAX_UPLOAD_BYTES + 1024 * 1024;

/// Build the full router. The admin sub-router is wrapped in the
/// basic-auth middleware before merging; everything shares one `AppState`.
pub fn routes(state: AppState) -> Router {
    let admin = Router::new()
        .route("/api/entries", get(list_entries))
        .route("/api/entries/{id}", delete(delete_entry))
        .route("/api/status", get(status))
        .route("/api/statistics", get(statistics))
        .route("/api/reconcile", post(reconcile))
        .route("/admin", get(admin_page))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin,
        ));

    Router::new()
        .route(
            "/api/upload",
            post(upload).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/api/media/{filename}", get(get_media))
        .route("/api/guests", get(public_gallery))
        .route("/health", get(health))
        .merge(admin)
        .with_state(state)
}
