//! Wire types for upload responses, the status probe, statistics, and the
//! reconciliation sweep.

use serde::Serialize;
use std::collections::HashMap;

/// Body returned by a successful upload.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub id: i64,
    pub media_url: String,
}

/// Aggregate statistics over all entries. Computed in one logical pass;
/// there is no meaningful partial result, so any sub-query failure fails
/// the whole report.
#[derive(Serialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    /// Total number of entries.
    pub total_entries: i64,

    /// Entries uploaded since local midnight.
    pub entries_today: i64,

    /// Sum of file sizes in bytes.
    pub total_storage: i64,

    /// Number of distinct guest names.
    pub distinct_names: i64,

    /// Entry count grouped by declared mime type.
    pub by_mime_type: HashMap<String, i64>,
}

/// Independent reachability checks for the admin status probe. One check
/// failing never short-circuits the others.
#[derive(Serialize, Debug)]
pub struct StatusReport {
    /// Record store answered a trivial query.
    pub database: bool,

    /// Object store listed its buckets.
    pub minio: bool,

    /// The configured bucket exists.
    pub bucket: bool,

    /// Human-readable failure details, one per failed check.
    pub errors: Vec<String>,
}

/// Outcome of one reconciliation sweep. Running the sweep again
/// immediately afterwards reports nothing.
#[derive(Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Ids of records whose object was missing; the records were deleted.
    pub removed_records: Vec<i64>,

    /// Keys of objects no record referenced; the objects were removed.
    pub removed_objects: Vec<String>,
}
