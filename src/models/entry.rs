//! Represents a single guestbook contribution.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One uploaded guestbook contribution.
///
/// An entry pairs guest-supplied metadata (name, message) with the object
/// stored under `filename`. Entries are create-once, delete-whole: there is
/// no update operation.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GuestEntry {
    /// Store-assigned id, monotonically increasing, immutable.
    pub id: i64,

    /// Display name supplied by the guest. Never empty.
    pub name: String,

    /// Optional free-text message, empty string when omitted.
    pub message: String,

    /// Public reference path, `/api/media/{filename}`. Immutable.
    pub media_url: String,

    /// Object-store key holding the binary payload. Globally unique.
    pub filename: String,

    /// Byte length of the uploaded payload.
    pub file_size: i64,

    /// Content type as declared by the upload. Trusted, not re-sniffed.
    pub mime_type: String,

    /// Milliseconds since epoch at upload time. Sole ordering key.
    pub timestamp: i64,
}

/// Field set for inserting a new entry; the id is assigned by the store.
#[derive(Clone, Debug)]
pub struct NewEntry {
    pub name: String,
    pub message: String,
    pub media_url: String,
    pub filename: String,
    pub file_size: i64,
    pub mime_type: String,
    pub timestamp: i64,
}
