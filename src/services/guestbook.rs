//! Guestbook pipelines — upload, deletion, read projections, status,
//! statistics, and the orphan reconciliation sweep.
//!
//! The upload and deletion pipelines coordinate two independent stores with
//! no transaction boundary between them. Write order is chosen so that any
//! partial failure leaves a *detectable* inconsistency (an orphaned object
//! after a failed insert, an orphaned record after an interrupted delete),
//! never a silent one; `reconcile` repairs both.

use crate::models::{
    entry::{GuestEntry, NewEntry},
    object_meta::ObjectMeta,
    reports::{ReconcileReport, Statistics, StatusReport, UploadResponse},
};
use crate::services::{
    health::HealthState,
    object_store::{ObjectStore, StoreError},
    record_store::{PUBLIC_GALLERY_LIMIT, RecordStore},
};
use bytes::Bytes;
use chrono::{Local, NaiveTime, Utc};
use futures::{future, stream};
use std::collections::HashSet;
use std::io;
use std::path::Path;
use thiserror::Error;
use tokio::fs::File;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Hard cap on an uploaded payload.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Formats accepted as both file extension and mime subtype. Both sides of
/// an upload must match; a mismatched pair is rejected even if one matches.
const ALLOWED_FORMATS: [&str; 7] = ["jpeg", "jpg", "png", "gif", "mp4", "webm", "ogg"];

/// Longest slice of the sanitized original filename kept in a derived key.
const KEY_STEM_MAX_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum GuestbookError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("file exceeds the {MAX_UPLOAD_BYTES} byte upload limit")]
    PayloadTooLarge,
    #[error("media storage is currently unavailable")]
    Unavailable,
    #[error("entry {0} not found")]
    EntryNotFound(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// One file part of a multipart upload, fully buffered.
#[derive(Clone, Debug)]
pub struct UploadedFile {
    pub original_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

/// Decoded upload form: guest fields plus at most one file part.
#[derive(Clone, Debug, Default)]
pub struct UploadRequest {
    pub name: String,
    pub message: String,
    pub file: Option<UploadedFile>,
}

#[derive(Clone)]
pub struct GuestbookService {
    store: ObjectStore,
    records: RecordStore,
    health: HealthState,
    bucket: String,
}

impl GuestbookService {
    pub fn new(
        store: ObjectStore,
        records: RecordStore,
        health: HealthState,
        bucket: String,
    ) -> Self {
        Self {
            store,
            records,
            health,
            bucket,
        }
    }

    pub fn health(&self) -> &HealthState {
        &self.health
    }

    /// Upload pipeline: validate, derive a unique key, write the object,
    /// then insert the record.
    ///
    /// Rejections happen before either store is touched, so a rejected
    /// upload has zero side effects. If the record insert fails after the
    /// object write succeeded, the object is orphaned: it is logged at
    /// ERROR with bucket and key and left for the reconciliation sweep.
    pub async fn upload(&self, request: UploadRequest) -> Result<UploadResponse, GuestbookError> {
        let file = request
            .file
            .ok_or(GuestbookError::Validation("no file uploaded"))?;

        let ext = extension_of(&file.original_name)
            .ok_or(GuestbookError::Validation("invalid file type"))?;
        if !format_allowed(&ext, &file.mime_type) {
            return Err(GuestbookError::Validation("invalid file type"));
        }
        if file.data.len() > MAX_UPLOAD_BYTES {
            return Err(GuestbookError::PayloadTooLarge);
        }
        if !self.health.is_healthy() {
            return Err(GuestbookError::Unavailable);
        }
        let name = request.name.trim();
        if name.is_empty() {
            return Err(GuestbookError::Validation("name is required"));
        }

        let timestamp = Utc::now().timestamp_millis();
        let key = derive_key(timestamp, &file.original_name, &ext);
        let file_size = file.data.len() as i64;

        self.store
            .put_object(
                &self.bucket,
                &key,
                Some(file.mime_type.clone()),
                &file.original_name,
                stream::once(future::ready(io::Result::Ok(file.data))),
            )
            .await?;

        let entry = NewEntry {
            name: name.to_string(),
            message: request.message,
            media_url: format!("/api/media/{key}"),
            filename: key.clone(),
            file_size,
            mime_type: file.mime_type,
            timestamp,
        };

        let id = match self.records.insert(&entry).await {
            Ok(id) => id,
            Err(err) => {
                error!(
                    bucket = %self.bucket,
                    key = %key,
                    "record insert failed after object write; object is orphaned until the next reconcile: {err}"
                );
                return Err(err.into());
            }
        };

        info!(id, key = %key, size = file_size, "stored guestbook entry");
        Ok(UploadResponse {
            success: true,
            id,
            media_url: entry.media_url,
        })
    }

    /// Deletion pipeline: record lookup, object removal, record removal —
    /// in that order.
    ///
    /// A store failure at step (b) is a hard stop that keeps the record,
    /// since deleting it first would orphan the object permanently with no
    /// record left to reconcile it. A *missing* object is the one
    /// exception: that record is already orphaned, so the delete proceeds.
    pub async fn delete_entry(&self, id: i64) -> Result<(), GuestbookError> {
        let entry = self
            .records
            .select_by_id(id)
            .await?
            .ok_or(GuestbookError::EntryNotFound(id))?;

        match self.store.remove_object(&self.bucket, &entry.filename).await {
            Ok(()) => {}
            Err(StoreError::ObjectNotFound { .. }) => {
                warn!(id, filename = %entry.filename, "deleting orphaned record; object already gone");
            }
            Err(err) => return Err(err.into()),
        }

        if !self.records.delete_by_id(id).await? {
            return Err(GuestbookError::EntryNotFound(id));
        }
        info!(id, filename = %entry.filename, "deleted guestbook entry");
        Ok(())
    }

    /// Public gallery projection: media URLs only, newest first, capped.
    pub async fn public_gallery(&self) -> Result<Vec<String>, GuestbookError> {
        Ok(self.records.select_public(PUBLIC_GALLERY_LIMIT).await?)
    }

    /// Full admin projection, newest first, unbounded.
    pub async fn entries(&self) -> Result<Vec<GuestEntry>, GuestbookError> {
        Ok(self.records.select_full().await?)
    }

    /// Open a stored object for streaming out to a media request.
    pub async fn media(&self, filename: &str) -> Result<(ObjectMeta, File), GuestbookError> {
        Ok(self.store.get_object_reader(&self.bucket, filename).await?)
    }

    /// Status probe: three independent reachability checks. One failing
    /// never short-circuits the others.
    pub async fn status(&self) -> StatusReport {
        let mut errors = Vec::new();

        let database = match self.records.ping().await {
            Ok(()) => true,
            Err(err) => {
                errors.push(format!("database: {err}"));
                false
            }
        };
        let minio = match self.store.list_buckets().await {
            Ok(_) => true,
            Err(err) => {
                errors.push(format!("object store: {err}"));
                false
            }
        };
        let bucket = match self.store.bucket_exists(&self.bucket).await {
            Ok(true) => true,
            Ok(false) => {
                errors.push(format!("bucket `{}` does not exist", self.bucket));
                false
            }
            Err(err) => {
                errors.push(format!("bucket: {err}"));
                false
            }
        };

        StatusReport {
            database,
            minio,
            bucket,
            errors,
        }
    }

    /// Aggregate statistics with "today" anchored at local midnight.
    pub async fn statistics(&self) -> Result<Statistics, GuestbookError> {
        Ok(self.records.aggregate(start_of_today_ms()).await?)
    }

    /// Idempotent orphan sweep across both stores.
    ///
    /// Records whose object is missing are deleted; objects no record
    /// references are removed. Running the sweep twice in a row reports
    /// nothing the second time.
    pub async fn reconcile(&self) -> Result<ReconcileReport, GuestbookError> {
        let stored: HashSet<String> = self
            .store
            .list_objects(&self.bucket)
            .await?
            .into_iter()
            .collect();
        let rows = self.records.select_filenames().await?;
        let referenced: HashSet<&str> = rows.iter().map(|(_, f)| f.as_str()).collect();

        let mut report = ReconcileReport::default();

        for (id, filename) in &rows {
            if !stored.contains(filename) {
                warn!(id, filename = %filename, "removing orphaned record");
                if self.records.delete_by_id(*id).await? {
                    report.removed_records.push(*id);
                }
            }
        }

        for key in &stored {
            if !referenced.contains(key.as_str()) {
                warn!(key = %key, "removing orphaned object");
                match self.store.remove_object(&self.bucket, key).await {
                    Ok(()) => report.removed_objects.push(key.clone()),
                    // Raced with another sweep; already gone.
                    Err(StoreError::ObjectNotFound { .. }) => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }

        if !report.removed_records.is_empty() || !report.removed_objects.is_empty() {
            info!(
                records = report.removed_records.len(),
                objects = report.removed_objects.len(),
                "reconciliation sweep removed orphans"
            );
        }
        Ok(report)
    }
}

/// Lowercased file extension, if any.
fn extension_of(original_name: &str) -> Option<String> {
    Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Both the extension and the declared mime subtype must be on the
/// allow-list. The subtype comparison deliberately ignores the top-level
/// type so `video/ogg` and `audio/ogg` both resolve to `ogg`.
fn format_allowed(ext: &str, mime_type: &str) -> bool {
    if !ALLOWED_FORMATS.contains(&ext) {
        return false;
    }
    let subtype = mime_type
        .split(';')
        .next()
        .and_then(|essence| essence.split('/').nth(1))
        .map(str::trim)
        .unwrap_or("");
    ALLOWED_FORMATS.contains(&subtype.to_ascii_lowercase().as_str())
}

/// Derive a unique object key: upload timestamp, a bounded sanitized slice
/// of the original filename, a random fragment, and the original
/// extension. The random fragment keeps concurrent same-millisecond
/// uploads of the same filename from colliding.
fn derive_key(timestamp_ms: i64, original_name: &str, ext: &str) -> String {
    let stem: String = Path::new(original_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .take(KEY_STEM_MAX_LEN)
        .collect();
    let stem = if stem.is_empty() {
        "upload".to_string()
    } else {
        stem
    };
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{timestamp_ms}-{stem}-{}.{ext}", &suffix[..8])
}

/// Milliseconds since epoch at the most recent local midnight.
fn start_of_today_ms() -> i64 {
    Local::now()
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .single()
        .map(|midnight| midnight.timestamp_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;

    async fn test_service(healthy: bool) -> GuestbookService {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let records = RecordStore::new(Arc::new(pool));
        records.ensure_schema().await.unwrap();

        let base = std::env::temp_dir().join(format!("guestbook-svc-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&base).unwrap();
        let store = ObjectStore::new(base);
        store.make_bucket("media").await.unwrap();

        let health = HealthState::new();
        health.set(healthy);

        GuestbookService::new(store, records, health, "media".into())
    }

    fn upload_request(name: &str, filename: &str, mime: &str, data: &[u8]) -> UploadRequest {
        UploadRequest {
            name: name.into(),
            message: "hi".into(),
            file: Some(UploadedFile {
                original_name: filename.into(),
                mime_type: mime.into(),
                data: Bytes::copy_from_slice(data),
            }),
        }
    }

    async fn assert_no_side_effects(service: &GuestbookService) {
        assert!(service.entries().await.unwrap().is_empty());
        assert!(
            service
                .store
                .list_objects("media")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn valid_upload_heads_the_gallery() {
        let service = test_service(true).await;
        let response = service
            .upload(upload_request(
                "Alice",
                "photo.jpg",
                "image/jpeg",
                &[0u8; 2048],
            ))
            .await
            .unwrap();

        assert!(response.success);
        assert!(response.media_url.starts_with("/api/media/"));
        assert!(response.media_url.ends_with(".jpg"));

        let gallery = service.public_gallery().await.unwrap();
        assert_eq!(gallery.first(), Some(&response.media_url));

        let entries = service.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, response.id);
        assert_eq!(entries[0].name, "Alice");
        assert_eq!(entries[0].file_size, 2048);
    }

    #[tokio::test]
    async fn newest_upload_comes_first() {
        let service = test_service(true).await;
        service
            .upload(upload_request("a", "one.png", "image/png", b"1"))
            .await
            .unwrap();
        let second = service
            .upload(upload_request("b", "two.png", "image/png", b"2"))
            .await
            .unwrap();

        let gallery = service.public_gallery().await.unwrap();
        assert_eq!(gallery[0], second.media_url);
    }

    #[tokio::test]
    async fn missing_file_is_rejected() {
        let service = test_service(true).await;
        let err = service
            .upload(UploadRequest {
                name: "Alice".into(),
                ..UploadRequest::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GuestbookError::Validation("no file uploaded")));
        assert_no_side_effects(&service).await;
    }

    #[tokio::test]
    async fn disallowed_type_leaves_no_trace() {
        let service = test_service(true).await;
        let err = service
            .upload(upload_request("Alice", "notes.txt", "text/plain", b"hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, GuestbookError::Validation("invalid file type")));
        assert_no_side_effects(&service).await;
    }

    #[tokio::test]
    async fn mismatched_extension_and_mime_are_both_required() {
        let service = test_service(true).await;
        // Good extension, bad mime.
        let err = service
            .upload(upload_request("a", "photo.jpg", "text/plain", b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, GuestbookError::Validation(_)));
        // Good mime, bad extension.
        let err = service
            .upload(upload_request("a", "notes.txt", "image/jpeg", b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, GuestbookError::Validation(_)));
        assert_no_side_effects(&service).await;
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let service = test_service(true).await;
        let data = vec![0u8; MAX_UPLOAD_BYTES + 1];
        let err = service
            .upload(upload_request("a", "big.png", "image/png", &data))
            .await
            .unwrap_err();
        assert!(matches!(err, GuestbookError::PayloadTooLarge));
        assert_no_side_effects(&service).await;
    }

    #[tokio::test]
    async fn unhealthy_store_fails_fast_with_no_store_calls() {
        let service = test_service(false).await;
        let err = service
            .upload(upload_request("a", "photo.jpg", "image/jpeg", b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, GuestbookError::Unavailable));
        assert_no_side_effects(&service).await;
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let service = test_service(true).await;
        let err = service
            .upload(upload_request("   ", "photo.jpg", "image/jpeg", b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, GuestbookError::Validation("name is required")));
        assert_no_side_effects(&service).await;
    }

    #[tokio::test]
    async fn delete_removes_object_and_record() {
        let service = test_service(true).await;
        let response = service
            .upload(upload_request("a", "photo.jpg", "image/jpeg", b"data"))
            .await
            .unwrap();
        let filename = response
            .media_url
            .trim_start_matches("/api/media/")
            .to_string();

        service.delete_entry(response.id).await.unwrap();

        assert!(service.entries().await.unwrap().is_empty());
        assert!(matches!(
            service.media(&filename).await,
            Err(GuestbookError::Store(StoreError::ObjectNotFound { .. }))
        ));

        // Second delete of the same id: not found, state unchanged.
        assert!(matches!(
            service.delete_entry(response.id).await,
            Err(GuestbookError::EntryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_unknown_id_changes_nothing() {
        let service = test_service(true).await;
        service
            .upload(upload_request("a", "photo.jpg", "image/jpeg", b"data"))
            .await
            .unwrap();
        assert!(matches!(
            service.delete_entry(9999).await,
            Err(GuestbookError::EntryNotFound(9999))
        ));
        assert_eq!(service.entries().await.unwrap().len(), 1);
        assert_eq!(service.store.list_objects("media").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_an_orphaned_record_succeeds() {
        let service = test_service(true).await;
        let response = service
            .upload(upload_request("a", "photo.jpg", "image/jpeg", b"data"))
            .await
            .unwrap();
        let filename = response
            .media_url
            .trim_start_matches("/api/media/")
            .to_string();
        service
            .store
            .remove_object("media", &filename)
            .await
            .unwrap();

        service.delete_entry(response.id).await.unwrap();
        assert!(service.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn statistics_are_consistent_with_entries() {
        let service = test_service(true).await;
        service
            .upload(upload_request("alice", "a.jpg", "image/jpeg", &[0u8; 100]))
            .await
            .unwrap();
        service
            .upload(upload_request("alice", "b.png", "image/png", &[0u8; 50]))
            .await
            .unwrap();
        service
            .upload(upload_request("bob", "c.mp4", "video/mp4", &[0u8; 25]))
            .await
            .unwrap();

        let entries = service.entries().await.unwrap();
        let stats = service.statistics().await.unwrap();
        assert_eq!(stats.total_entries, entries.len() as i64);
        assert_eq!(
            stats.total_storage,
            entries.iter().map(|e| e.file_size).sum::<i64>()
        );
        assert_eq!(stats.distinct_names, 2);
        // Everything just uploaded counts as today.
        assert_eq!(stats.entries_today, 3);
    }

    #[tokio::test]
    async fn status_reports_all_checks_independently() {
        let service = test_service(true).await;
        let report = service.status().await;
        assert!(report.database);
        assert!(report.minio);
        assert!(report.bucket);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn reconcile_removes_both_orphan_kinds_and_is_idempotent() {
        let service = test_service(true).await;
        let kept = service
            .upload(upload_request("a", "keep.png", "image/png", b"keep"))
            .await
            .unwrap();

        // Orphaned object: stored binary with no referencing record.
        service
            .store
            .put_object(
                "media",
                "123-stray-deadbeef.png",
                None,
                "stray.png",
                stream::once(future::ready(io::Result::Ok(Bytes::from_static(b"x")))),
            )
            .await
            .unwrap();

        // Orphaned record: row whose object no longer exists.
        let orphan_id = service
            .records
            .insert(&NewEntry {
                name: "ghost".into(),
                message: String::new(),
                media_url: "/api/media/456-ghost-cafebabe.png".into(),
                filename: "456-ghost-cafebabe.png".into(),
                file_size: 1,
                mime_type: "image/png".into(),
                timestamp: 456,
            })
            .await
            .unwrap();

        let report = service.reconcile().await.unwrap();
        assert_eq!(report.removed_records, vec![orphan_id]);
        assert_eq!(
            report.removed_objects,
            vec!["123-stray-deadbeef.png".to_string()]
        );

        // The healthy entry survives and a second sweep is a no-op.
        let entries = service.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, kept.id);
        let again = service.reconcile().await.unwrap();
        assert!(again.removed_records.is_empty());
        assert!(again.removed_objects.is_empty());
    }

    #[test]
    fn derive_key_is_unique_for_identical_inputs() {
        let a = derive_key(1_700_000_000_000, "photo.jpg", "jpg");
        let b = derive_key(1_700_000_000_000, "photo.jpg", "jpg");
        assert_ne!(a, b);
        assert!(a.starts_with("1700000000000-photo-"));
        assert!(a.ends_with(".jpg"));
    }

    #[test]
    fn derive_key_sanitizes_hostile_names() {
        let key = derive_key(1, "../../UN SAFE näme!!.PNG", "png");
        assert!(key.ends_with(".png"));
        let stem = &key[2..key.len() - 4];
        assert!(stem.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));

        let fallback = derive_key(1, "....", "png");
        assert!(fallback.contains("-upload-"));
    }

    #[test]
    fn format_allow_list_matches_on_subtype() {
        assert!(format_allowed("jpg", "image/jpeg"));
        assert!(format_allowed("ogg", "audio/ogg"));
        assert!(format_allowed("ogg", "video/ogg; codecs=theora"));
        assert!(!format_allowed("txt", "text/plain"));
        assert!(!format_allowed("jpg", "application/octet-stream"));
        assert!(!format_allowed("exe", "image/png"));
    }
}
