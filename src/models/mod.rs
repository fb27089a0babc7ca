//! Core data models for the guestbook media service.
//!
//! These entities represent guest entries and the read-only projections the
//! admin panel consumes. They map cleanly to database rows via
//! `sqlx::FromRow` and serialize naturally as JSON via `serde`.

pub mod entry;
pub mod object_meta;
pub mod reports;
