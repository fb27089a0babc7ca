//! Metadata attached to a stored object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata persisted alongside an object payload.
///
/// Written as a JSON sidecar next to the payload file so the object store
/// can answer `stat` without consulting the record store.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ObjectMeta {
    /// Object key within its bucket.
    pub key: String,

    /// Content type declared at upload time.
    pub content_type: Option<String>,

    /// Original filename the guest uploaded.
    pub original_name: String,

    /// When the object was written.
    pub upload_date: DateTime<Utc>,

    /// Payload size in bytes.
    pub size_bytes: i64,

    /// MD5 checksum of the payload, computed while streaming.
    pub etag: String,
}
