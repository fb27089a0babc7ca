//! Object store client — bucket/key addressed binary storage on local disk.
//!
//! Payloads live beneath `base_path/{bucket}/{shard}/{shard}/{key}` with a
//! JSON sidecar (`{key}.meta`) holding content-type, original-name and
//! upload-date metadata, so `stat` never consults the record store. Writes
//! go through a temp file, fsync, then an atomic rename.
//!
//! `put_object` is **not** retry-safe on the same key: duplicate-key
//! collisions are avoided by key derivation upstream, not by store
//! semantics.

use crate::models::object_meta::ObjectMeta;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error("object metadata corrupt: {0}")]
    Meta(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const META_SUFFIX: &str = ".meta";

/// Client over the binary object store.
///
/// Surface mirrors the minimal S3-style capability set the pipelines need:
/// bucket-exists/create, put, get, stat, remove, plus bucket and object
/// listing for the health probe and the reconciliation sweep.
#[derive(Clone, Debug)]
pub struct ObjectStore {
    /// Root directory under which buckets live.
    base_path: PathBuf,
}

impl ObjectStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    ///
    /// Rejects empty keys, keys that begin with `/` or contain `..`, and
    /// keys carrying control bytes or backslashes.
    fn ensure_key_safe(&self, key: &str) -> StoreResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StoreError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.contains("..") || key.contains('/') {
            return Err(StoreError::InvalidObjectKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StoreError::InvalidObjectKey);
        }
        if key.ends_with(META_SUFFIX) {
            return Err(StoreError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Validate bucket name format: 3–63 characters, lowercase letters,
    /// digits, dots and hyphens, no leading/trailing punctuation.
    fn ensure_bucket_name_safe(&self, name: &str) -> StoreResult<()> {
        let len = name.len();
        if len < BUCKET_NAME_MIN_LEN || len > BUCKET_NAME_MAX_LEN {
            return Err(StoreError::InvalidBucketName {
                name: name.to_string(),
                reason: "must be between 3 and 63 characters".into(),
            });
        }
        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return Err(StoreError::InvalidBucketName {
                name: name.to_string(),
                reason: "allowed characters are lowercase letters, digits, dots, and hyphens"
                    .into(),
            });
        }
        if name.starts_with('.')
            || name.ends_with('.')
            || name.starts_with('-')
            || name.ends_with('-')
        {
            return Err(StoreError::InvalidBucketName {
                name: name.to_string(),
                reason: "must start and end with a lowercase letter or digit".into(),
            });
        }
        Ok(())
    }

    fn bucket_root(&self, bucket: &str) -> PathBuf {
        let mut path = self.base_path.clone();
        path.push(bucket);
        path
    }

    /// Two-level shard identifiers for an object key: the first two bytes
    /// of MD5(bucket/key) as lowercase hex. Keeps per-directory file counts
    /// bounded.
    fn object_shards(bucket: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket, key);
        let mut path = self.bucket_root(bucket);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn meta_path(&self, bucket: &str, key: &str) -> PathBuf {
        let mut path = self.object_path(bucket, key);
        path.set_file_name(format!("{}{}", key, META_SUFFIX));
        path
    }

    /// List bucket names under the store root. Also serves as the health
    /// probe: an unreachable root surfaces as an error here.
    pub async fn list_buckets(&self) -> StoreResult<Vec<String>> {
        let mut buckets = Vec::new();
        let mut dir = fs::read_dir(&self.base_path).await?;
        while let Some(dent) = dir.next_entry().await? {
            if dent.file_type().await?.is_dir() {
                buckets.push(dent.file_name().to_string_lossy().into_owned());
            }
        }
        buckets.sort();
        Ok(buckets)
    }

    pub async fn bucket_exists(&self, bucket: &str) -> StoreResult<bool> {
        self.ensure_bucket_name_safe(bucket)?;
        match fs::metadata(self.bucket_root(bucket)).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    pub async fn make_bucket(&self, bucket: &str) -> StoreResult<()> {
        self.ensure_bucket_name_safe(bucket)?;
        fs::create_dir_all(self.bucket_root(bucket)).await?;
        Ok(())
    }

    /// Stream an object payload into the bucket under `key`.
    ///
    /// Writes incrementally to a temp file while computing size and MD5,
    /// fsyncs, renames into place, then writes the metadata sidecar. On any
    /// failure the temp file (and, if the sidecar fails, the renamed
    /// payload) is removed so a failed put leaves no trace.
    pub async fn put_object<S>(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        original_name: &str,
        stream: S,
    ) -> StoreResult<ObjectMeta>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        self.ensure_key_safe(key)?;
        if !self.bucket_exists(bucket).await? {
            return Err(StoreError::BucketNotFound(bucket.to_string()));
        }

        let file_path = self.object_path(bucket, key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| StoreError::Io(io::Error::other("object path missing parent")))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StoreError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        let meta = ObjectMeta {
            key: key.to_string(),
            content_type,
            original_name: original_name.to_string(),
            upload_date: Utc::now(),
            size_bytes,
            etag: format!("{:x}", digest.compute()),
        };

        let encoded = serde_json::to_vec(&meta)?;
        if let Err(err) = fs::write(self.meta_path(bucket, key), encoded).await {
            let _ = fs::remove_file(&file_path).await;
            return Err(StoreError::Io(err));
        }

        debug!(bucket, key, size = size_bytes, "stored object");
        Ok(meta)
    }

    /// Fetch object metadata from the sidecar. Size is cross-checked
    /// against the payload file so a truncated payload is visible.
    pub async fn stat_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectMeta> {
        self.ensure_key_safe(key)?;
        let raw = match fs::read(self.meta_path(bucket, key)).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
            }
            Err(err) => return Err(StoreError::Io(err)),
        };
        let mut meta: ObjectMeta = serde_json::from_slice(&raw)?;
        if let Ok(fs_meta) = fs::metadata(self.object_path(bucket, key)).await {
            meta.size_bytes = fs_meta.len() as i64;
        }
        Ok(meta)
    }

    /// Open an object for reading. Returns metadata plus a file handle
    /// ready for streaming out.
    pub async fn get_object_reader(
        &self,
        bucket: &str,
        key: &str,
    ) -> StoreResult<(ObjectMeta, File)> {
        let meta = self.stat_object(bucket, key).await?;
        let file = File::open(self.object_path(bucket, key))
            .await
            .map_err(|err| {
                if err.kind() == ErrorKind::NotFound {
                    StoreError::ObjectNotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    StoreError::Io(err)
                }
            })?;
        Ok((meta, file))
    }

    /// Remove an object and its sidecar, pruning emptied shard directories.
    pub async fn remove_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.ensure_key_safe(key)?;
        let file_path = self.object_path(bucket, key);
        match fs::remove_file(&file_path).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
            }
            Err(err) => return Err(StoreError::Io(err)),
        }
        match fs::remove_file(self.meta_path(bucket, key)).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(bucket, key, "sidecar already missing");
            }
            Err(err) => return Err(StoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            let bucket_root = self.bucket_root(bucket);
            self.prune_empty_dirs(parent, &bucket_root).await;
        }
        Ok(())
    }

    /// List all object keys in a bucket by walking the two shard levels,
    /// skipping sidecars and abandoned temp files. Feeds the
    /// reconciliation sweep.
    pub async fn list_objects(&self, bucket: &str) -> StoreResult<Vec<String>> {
        if !self.bucket_exists(bucket).await? {
            return Err(StoreError::BucketNotFound(bucket.to_string()));
        }
        let mut keys = Vec::new();
        let mut shards_a = fs::read_dir(self.bucket_root(bucket)).await?;
        while let Some(shard_a) = shards_a.next_entry().await? {
            if !shard_a.file_type().await?.is_dir() {
                continue;
            }
            let mut shards_b = fs::read_dir(shard_a.path()).await?;
            while let Some(shard_b) = shards_b.next_entry().await? {
                if !shard_b.file_type().await?.is_dir() {
                    continue;
                }
                let mut objects = fs::read_dir(shard_b.path()).await?;
                while let Some(obj) = objects.next_entry().await? {
                    let name = obj.file_name().to_string_lossy().into_owned();
                    if name.ends_with(META_SUFFIX) || name.starts_with(".tmp-") {
                        continue;
                    }
                    keys.push(name);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Recursively remove empty directories up to the bucket root. Stops at
    /// the first non-empty or missing directory.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(()) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}
