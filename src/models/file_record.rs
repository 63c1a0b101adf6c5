//! Represents one logical file stored in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata for a single file.
///
/// The record does not hold content bytes. `blob_key` points at the blob in
/// the blob store; `file_id` is the file's identity and never changes, while
/// `file_name` is only the display name supplied at upload time.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct FileRecord {
    /// Generated identifier (UUID v4).
    pub file_id: Uuid,

    /// Name of the bucket this file lives in.
    pub bucket_name: String,

    /// Original filename of the uploaded file.
    pub file_name: String,

    /// Key of the backing blob.
    pub blob_key: String,

    /// Content type (MIME type) as reported by the client.
    pub content_type: Option<String>,

    /// Size in bytes of the current content.
    pub size_bytes: i64,

    /// Integrity tag (unquoted MD5 hex) of the current content.
    pub etag: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Last time the content changed.
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    /// Blob key layout used for every file: `files/{bucket}/{file_id}`.
    pub fn blob_key_for(bucket_name: &str, file_id: &Uuid) -> String {
        format!("files/{}/{}", bucket_name, file_id)
    }

    /// Key prefix under which all blobs of `bucket_name` live.
    pub fn bucket_prefix(bucket_name: &str) -> String {
        format!("files/{}/", bucket_name)
    }
}
