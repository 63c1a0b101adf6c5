//! Metadata index contract.
//!
//! The index maps (bucket, file id) to a [`FileRecord`] and keeps the set of
//! buckets. It never touches blob content.

use crate::models::{bucket::Bucket, file_record::FileRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("bucket `{0}` already exists")]
    DuplicateBucket(String),
    #[error("metadata index unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type IndexResult<T> = Result<T, IndexError>;

/// New content attributes written after a blob overwrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentUpdate {
    /// Replaces the stored content type when present.
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub etag: String,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait MetadataIndex: Send + Sync + 'static {
    /// Insert a bucket. Fails with `DuplicateBucket` if the name is taken.
    async fn insert_bucket(&self, bucket: &Bucket) -> IndexResult<()>;

    async fn find_bucket(&self, name: &str) -> IndexResult<Option<Bucket>>;

    /// All buckets ordered by name.
    async fn list_buckets(&self) -> IndexResult<Vec<Bucket>>;

    async fn insert_file_record(&self, record: &FileRecord) -> IndexResult<()>;

    async fn find_file_record(&self, bucket: &str, file_id: &Uuid)
    -> IndexResult<Option<FileRecord>>;

    async fn find_file_record_by_blob_key(
        &self,
        bucket: &str,
        blob_key: &str,
    ) -> IndexResult<Option<FileRecord>>;

    /// All records of `bucket` in upload order.
    async fn list_file_records(&self, bucket: &str) -> IndexResult<Vec<FileRecord>>;

    /// Apply `update` and return the refreshed record, or `None` if the
    /// record no longer exists.
    async fn update_file_content(
        &self,
        file_id: &Uuid,
        update: &ContentUpdate,
    ) -> IndexResult<Option<FileRecord>>;

    /// Returns whether a record was removed.
    async fn delete_file_record(&self, bucket: &str, file_id: &Uuid) -> IndexResult<bool>;

    /// Lightweight connectivity check.
    async fn ping(&self) -> IndexResult<()>;
}
