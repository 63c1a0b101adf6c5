//! src/services/gateway.rs
//!
//! GatewayService: bucket and file lifecycle on top of a blob store and a
//! metadata index. The two collaborators are independent, so every
//! operation that touches both orders its writes to keep failures
//! recoverable:
//!
//! - upload writes the blob first, then the record. A failed record write
//!   leaves an orphaned blob that is reported, never rolled back.
//! - update writes nothing when the content hash is unchanged.
//! - delete removes the blob first, then the record. A failed record delete
//!   is reported separately so it can be retried.
//!
//! There is no locking across operations: concurrent writers to the same
//! file are last-writer-wins at the blob store.

use crate::{
    models::{
        bucket::Bucket,
        file_record::FileRecord,
        listing::{HierarchyListing, TreeListing},
    },
    services::{
        blob_store::{BlobStore, BlobStoreError},
        integrity::{IntegrityEngine, IntegrityError, IntegrityTag},
        link_issuer::{LinkError, LinkIssuer},
        lister::{ListingError, NamespaceLister, PageStream},
        metadata_index::{ContentUpdate, IndexError, MetadataIndex},
    },
};
use bytes::Bytes;
use chrono::Utc;
use futures::TryStreamExt;
use serde::Serialize;
use std::{collections::HashSet, io::Cursor, sync::Arc};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const BUCKET_NAME_MAX_LEN: usize = 63;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("file `{file}` not found in bucket `{bucket}`")]
    FileNotFound { bucket: String, file: String },
    #[error("file `{file_id}` in bucket `{bucket}` has no stored content")]
    FileNotOnDisk { bucket: String, file_id: Uuid },
    #[error("blob `{0}` not found")]
    BlobNotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("integrity lookup for `{key}` failed: {reason}")]
    LookupFailed { key: String, reason: String },
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("blob `{blob_key}` was written but its metadata was not: {reason}")]
    MetadataWriteFailed { blob_key: String, reason: String },
    #[error("blob `{blob_key}` was removed but record `{file_id}` was not: {reason}")]
    MetadataDeleteFailed {
        file_id: Uuid,
        blob_key: String,
        reason: String,
    },
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<IndexError> for GatewayError {
    fn from(err: IndexError) -> Self {
        GatewayError::Upstream(err.to_string())
    }
}

impl From<BlobStoreError> for GatewayError {
    fn from(err: BlobStoreError) -> Self {
        match err {
            BlobStoreError::InvalidKey(_) | BlobStoreError::InvalidToken => {
                GatewayError::InvalidArgument(err.to_string())
            }
            BlobStoreError::NotFound(key) => GatewayError::BlobNotFound(key),
            other => GatewayError::Upstream(other.to_string()),
        }
    }
}

impl From<LinkError> for GatewayError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::InvalidTtl(_) => GatewayError::InvalidArgument(err.to_string()),
            LinkError::Store(store) => store.into(),
        }
    }
}

impl From<ListingError> for GatewayError {
    fn from(err: ListingError) -> Self {
        match err {
            ListingError::Store(store) => store.into(),
            ListingError::Link(link) => link.into(),
            other => GatewayError::Upstream(other.to_string()),
        }
    }
}

impl From<IntegrityError> for GatewayError {
    fn from(err: IntegrityError) -> Self {
        match err {
            IntegrityError::LookupFailed { key, source } => GatewayError::LookupFailed {
                key,
                reason: source.to_string(),
            },
            IntegrityError::Read(io) => GatewayError::Upstream(io.to_string()),
        }
    }
}

/// Result of the read-after-write listing check.
///
/// The check runs against the store's listing, which may lag behind writes,
/// so `Unconfirmed` is a warning and never a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Verification {
    Confirmed,
    Unconfirmed { reason: String },
}

impl Verification {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Verification::Confirmed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Unchanged,
    Updated,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub record: FileRecord,
    pub verification: Verification,
}

#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub status: UpdateStatus,
    pub record: FileRecord,
    /// Absent when nothing was written.
    pub verification: Option<Verification>,
}

#[derive(Debug, Clone)]
pub struct Download {
    pub record: FileRecord,
    pub content: Bytes,
}

/// How an update names its target file.
#[derive(Debug, Clone)]
pub enum FileRef {
    Id(String),
    BlobKey(String),
}

impl FileRef {
    fn describe(&self) -> &str {
        match self {
            FileRef::Id(id) => id,
            FileRef::BlobKey(key) => key,
        }
    }
}

#[derive(Clone)]
pub struct GatewayService {
    blobs: Arc<dyn BlobStore>,
    index: Arc<dyn MetadataIndex>,
    integrity: IntegrityEngine,
    lister: NamespaceLister,
    links: LinkIssuer,
    default_link_ttl: i64,
}

impl GatewayService {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        index: Arc<dyn MetadataIndex>,
        default_link_ttl: i64,
    ) -> Self {
        let links = LinkIssuer::new(blobs.clone());
        Self {
            integrity: IntegrityEngine::new(blobs.clone()),
            lister: NamespaceLister::new(blobs.clone(), links.clone()),
            links,
            blobs,
            index,
            default_link_ttl,
        }
    }

    /// Validate bucket name format.
    ///
    /// - 1–63 characters
    /// - ASCII letters, digits, dots, hyphens, underscores (case-sensitive)
    /// - no surrounding whitespace, no `/`, so names never imply hierarchy
    fn ensure_bucket_name_valid(name: &str) -> GatewayResult<()> {
        let invalid = |reason: &str| {
            GatewayError::InvalidArgument(format!("bucket name `{}` {}", name, reason))
        };
        if name.is_empty() || name.len() > BUCKET_NAME_MAX_LEN {
            return Err(invalid("must be between 1 and 63 characters"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        {
            return Err(invalid(
                "may only contain letters, digits, dots, hyphens, and underscores",
            ));
        }
        if name == "." || name == ".." {
            return Err(invalid("is reserved"));
        }
        Ok(())
    }

    async fn fetch_bucket(&self, name: &str) -> GatewayResult<Bucket> {
        self.index
            .find_bucket(name)
            .await?
            .ok_or_else(|| GatewayError::BucketNotFound(name.to_string()))
    }

    async fn resolve(&self, bucket: &str, file: &FileRef) -> GatewayResult<FileRecord> {
        let not_found = || GatewayError::FileNotFound {
            bucket: bucket.to_string(),
            file: file.describe().to_string(),
        };
        let record = match file {
            FileRef::Id(raw) => match Uuid::parse_str(raw) {
                Ok(file_id) => self.index.find_file_record(bucket, &file_id).await?,
                Err(_) => None,
            },
            FileRef::BlobKey(key) => self.index.find_file_record_by_blob_key(bucket, key).await?,
        };
        record.ok_or_else(not_found)
    }

    /// Re-list the key after a write and report whether it showed up.
    async fn verify_visible(&self, blob_key: &str) -> Verification {
        let mut pages = self.lister.list_flat(Some(blob_key));
        let outcome = loop {
            match pages.try_next().await {
                Ok(Some(page)) if page.files.iter().any(|k| k == blob_key) => {
                    break Verification::Confirmed;
                }
                Ok(Some(_)) => continue,
                Ok(None) => {
                    break Verification::Unconfirmed {
                        reason: "key not yet visible in store listing".into(),
                    };
                }
                Err(err) => {
                    break Verification::Unconfirmed {
                        reason: err.to_string(),
                    };
                }
            }
        };
        if let Verification::Unconfirmed { reason } = &outcome {
            warn!("could not confirm write of {}: {}", blob_key, reason);
        }
        outcome
    }

    /// Create a bucket. Names are unique and case-sensitive.
    pub async fn create_bucket(&self, name: &str) -> GatewayResult<Bucket> {
        Self::ensure_bucket_name_valid(name)?;
        if self.index.find_bucket(name).await?.is_some() {
            return Err(GatewayError::BucketAlreadyExists(name.to_string()));
        }

        let bucket = Bucket::new(name);
        match self.index.insert_bucket(&bucket).await {
            Ok(()) => {
                info!("created bucket {}", name);
                Ok(bucket)
            }
            Err(IndexError::DuplicateBucket(_)) => {
                Err(GatewayError::BucketAlreadyExists(name.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn list_buckets(&self) -> GatewayResult<Vec<Bucket>> {
        Ok(self.index.list_buckets().await?)
    }

    /// Store a new file under a freshly generated id.
    ///
    /// Uploading the same display name twice creates two distinct files.
    pub async fn upload_file(
        &self,
        bucket: &str,
        file_name: &str,
        content_type: Option<String>,
        content: Bytes,
    ) -> GatewayResult<UploadOutcome> {
        if file_name.trim().is_empty() {
            return Err(GatewayError::InvalidArgument("file name is required".into()));
        }
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let file_id = Uuid::new_v4();
        let blob_key = FileRecord::blob_key_for(&bucket_rec.name, &file_id);
        let written = self.blobs.put(&blob_key, content).await?;

        let now = Utc::now();
        let record = FileRecord {
            file_id,
            bucket_name: bucket_rec.name,
            file_name: file_name.to_string(),
            blob_key: blob_key.clone(),
            content_type,
            size_bytes: written.size_bytes as i64,
            etag: Some(IntegrityTag::from_store(&written.integrity_tag).to_string()),
            created_at: now,
            updated_at: now,
        };

        if let Err(err) = self.index.insert_file_record(&record).await {
            error!(
                "orphaned blob {}: metadata insert failed: {}",
                blob_key, err
            );
            return Err(GatewayError::MetadataWriteFailed {
                blob_key,
                reason: err.to_string(),
            });
        }

        info!(
            "uploaded {} ({} bytes) to bucket {} as {}",
            record.file_name, record.size_bytes, record.bucket_name, record.file_id
        );
        let verification = self.verify_visible(&blob_key).await;
        Ok(UploadOutcome {
            record,
            verification,
        })
    }

    /// Replace a file's content, keeping its identity.
    ///
    /// Content whose hash matches the stored blob is not written at all.
    pub async fn update_file(
        &self,
        bucket: &str,
        file: FileRef,
        content_type: Option<String>,
        content: Bytes,
    ) -> GatewayResult<UpdateOutcome> {
        let record = self.resolve(bucket, &file).await?;

        let mut candidate = Cursor::new(content);
        let decision = self
            .integrity
            .evaluate(&record.blob_key, &mut candidate)
            .await?;
        if !decision.changed {
            debug!(
                "content of {} unchanged ({}), skipping write",
                record.file_id, decision.tag
            );
            return Ok(UpdateOutcome {
                status: UpdateStatus::Unchanged,
                record,
                verification: None,
            });
        }

        let written = self
            .blobs
            .put(&record.blob_key, candidate.into_inner())
            .await?;
        let update = ContentUpdate {
            content_type,
            size_bytes: written.size_bytes as i64,
            etag: IntegrityTag::from_store(&written.integrity_tag).to_string(),
            updated_at: Utc::now(),
        };

        let updated = match self.index.update_file_content(&record.file_id, &update).await {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                error!(
                    "blob {} rewritten but record {} disappeared",
                    record.blob_key, record.file_id
                );
                return Err(GatewayError::MetadataWriteFailed {
                    blob_key: record.blob_key,
                    reason: "file record was removed during update".into(),
                });
            }
            Err(err) => {
                error!(
                    "blob {} rewritten but metadata update failed: {}",
                    record.blob_key, err
                );
                return Err(GatewayError::MetadataWriteFailed {
                    blob_key: record.blob_key,
                    reason: err.to_string(),
                });
            }
        };

        info!("updated content of {} in bucket {}", updated.file_id, bucket);
        let verification = self.verify_visible(&updated.blob_key).await;
        Ok(UpdateOutcome {
            status: UpdateStatus::Updated,
            record: updated,
            verification: Some(verification),
        })
    }

    pub async fn list_files(&self, bucket: &str) -> GatewayResult<Vec<FileRecord>> {
        self.fetch_bucket(bucket).await?;
        Ok(self.index.list_file_records(bucket).await?)
    }

    pub async fn download_file(&self, bucket: &str, file_id: &str) -> GatewayResult<Download> {
        let record = self.resolve(bucket, &FileRef::Id(file_id.to_string())).await?;
        match self.blobs.get(&record.blob_key).await {
            Ok(content) => Ok(Download { record, content }),
            Err(BlobStoreError::NotFound(_)) => {
                warn!(
                    "record {} points at missing blob {}",
                    record.file_id, record.blob_key
                );
                Err(GatewayError::FileNotOnDisk {
                    bucket: bucket.to_string(),
                    file_id: record.file_id,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Remove a file: blob first (tolerating an already-missing blob), then
    /// the record.
    pub async fn delete_file(&self, bucket: &str, file_id: &str) -> GatewayResult<FileRecord> {
        let record = self.resolve(bucket, &FileRef::Id(file_id.to_string())).await?;

        match self.blobs.delete(&record.blob_key).await {
            Ok(()) => {}
            Err(BlobStoreError::NotFound(_)) => {
                debug!("blob {} already missing", record.blob_key);
            }
            Err(err) => return Err(err.into()),
        }

        match self.index.delete_file_record(bucket, &record.file_id).await {
            Ok(true) => {
                info!("deleted {} from bucket {}", record.file_id, bucket);
                Ok(record)
            }
            Ok(false) => Err(GatewayError::FileNotFound {
                bucket: bucket.to_string(),
                file: file_id.to_string(),
            }),
            Err(err) => {
                error!(
                    "blob {} removed but record {} remains: {}",
                    record.blob_key, record.file_id, err
                );
                Err(GatewayError::MetadataDeleteFailed {
                    file_id: record.file_id,
                    blob_key: record.blob_key,
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Signed link to one file. Falls back to the configured ttl.
    pub async fn file_link(
        &self,
        bucket: &str,
        file_id: &str,
        ttl_seconds: Option<i64>,
    ) -> GatewayResult<String> {
        let ttl = ttl_seconds.unwrap_or(self.default_link_ttl);
        LinkIssuer::validate_ttl(ttl)?;
        let record = self.resolve(bucket, &FileRef::Id(file_id.to_string())).await?;
        Ok(self.links.issue_link(&record.blob_key, ttl).await?)
    }

    /// Lazy page stream over one level of the store's key space.
    pub fn list_hierarchy(&self, prefix: Option<&str>) -> PageStream {
        self.lister.list_hierarchy(prefix)
    }

    pub async fn collect_hierarchy(&self, prefix: Option<&str>) -> GatewayResult<HierarchyListing> {
        Ok(self.lister.collect_hierarchy(prefix).await?)
    }

    pub async fn list_tree(&self, prefix: Option<&str>) -> GatewayResult<TreeListing> {
        Ok(self.lister.list_tree(prefix, self.default_link_ttl).await?)
    }

    /// Blob keys under the bucket's prefix with no file record.
    ///
    /// Reports only; deleting them is left to the operator. Records are read
    /// before blobs are listed, so an upload that is still in flight (blob
    /// written, record not yet inserted) shows up here too. Check again
    /// before acting on a key.
    pub async fn find_orphaned_blobs(&self, bucket: &str) -> GatewayResult<Vec<String>> {
        self.fetch_bucket(bucket).await?;
        let known: HashSet<String> = self
            .index
            .list_file_records(bucket)
            .await?
            .into_iter()
            .map(|record| record.blob_key)
            .collect();

        let mut orphans = Vec::new();
        let mut pages = self
            .lister
            .list_flat(Some(&FileRecord::bucket_prefix(bucket)));
        while let Some(page) = pages.try_next().await? {
            orphans.extend(page.files.into_iter().filter(|key| !known.contains(key)));
        }
        if !orphans.is_empty() {
            warn!("bucket {} has {} orphaned blobs", bucket, orphans.len());
        }
        Ok(orphans)
    }

    /// Raw blob read for verified signed links.
    pub async fn fetch_blob(&self, blob_key: &str) -> GatewayResult<Bytes> {
        Ok(self.blobs.get(blob_key).await?)
    }

    pub async fn check_index(&self) -> Result<(), IndexError> {
        self.index.ping().await
    }

    pub async fn check_blobs(&self) -> Result<(), BlobStoreError> {
        self.blobs.probe().await
    }
}
