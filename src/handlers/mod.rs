//! HTTP handlers, grouped by surface: public upload/gallery, admin panel,
//! and liveness.

pub mod admin_handlers;
pub mod gallery_handlers;
pub mod health_handlers;
pub mod upload_handlers;
