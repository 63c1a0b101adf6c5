//! In-memory blob store and metadata index for tests.
//!
//! Both keep their state in `tokio::sync::RwLock` maps and expose switches
//! that make individual operations fail, so partial-failure paths in the
//! gateway can be driven deterministically.

use crate::{
    models::{bucket::Bucket, file_record::FileRecord},
    services::{
        blob_store::{
            BlobMetadata, BlobPage, BlobResult, BlobStore, BlobStoreError, paginate_sorted_keys,
        },
        gateway::GatewayService,
        metadata_index::{ContentUpdate, IndexError, IndexResult, MetadataIndex},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::RwLock;
use uuid::Uuid;

pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Bytes>>,
    page_size: usize,
    puts: AtomicUsize,
    fail_puts: AtomicBool,
    fail_heads: AtomicBool,
    fail_deletes: AtomicBool,
    hide_from_listing: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            blobs: RwLock::new(BTreeMap::new()),
            page_size,
            puts: AtomicUsize::new(0),
            fail_puts: AtomicBool::new(false),
            fail_heads: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            hide_from_listing: AtomicBool::new(false),
        }
    }

    /// Number of successful `put` calls so far.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.blobs.read().await.contains_key(key)
    }

    /// Remove a blob behind the gateway's back.
    pub async fn remove_raw(&self, key: &str) {
        self.blobs.write().await.remove(key);
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_heads(&self, fail: bool) {
        self.fail_heads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Simulate an eventually-consistent listing that lags behind writes.
    pub fn hide_from_listing(&self, hide: bool) {
        self.hide_from_listing.store(hide, Ordering::SeqCst);
    }

    fn metadata(content: &Bytes) -> BlobMetadata {
        BlobMetadata {
            integrity_tag: format!("\"{:x}\"", md5::compute(content)),
            size_bytes: content.len() as u64,
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, content: Bytes) -> BlobResult<BlobMetadata> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(BlobStoreError::Upstream("injected put failure".into()));
        }
        let meta = Self::metadata(&content);
        self.blobs.write().await.insert(key.to_string(), content);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(meta)
    }

    async fn get(&self, key: &str) -> BlobResult<Bytes> {
        self.blobs
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BlobStoreError::Upstream("injected delete failure".into()));
        }
        self.blobs
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| BlobStoreError::NotFound(key.to_string()))
    }

    async fn head_metadata(&self, key: &str) -> BlobResult<BlobMetadata> {
        if self.fail_heads.load(Ordering::SeqCst) {
            return Err(BlobStoreError::Upstream("injected head failure".into()));
        }
        self.blobs
            .read()
            .await
            .get(key)
            .map(Self::metadata)
            .ok_or_else(|| BlobStoreError::NotFound(key.to_string()))
    }

    async fn list_page(
        &self,
        prefix: Option<&str>,
        delimiter: Option<&str>,
        continuation_token: Option<&str>,
    ) -> BlobResult<BlobPage> {
        if self.hide_from_listing.load(Ordering::SeqCst) {
            return Ok(BlobPage::default());
        }
        let blobs = self.blobs.read().await;
        paginate_sorted_keys(
            blobs.keys().map(String::as_str),
            prefix,
            delimiter,
            continuation_token,
            self.page_size,
        )
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> BlobResult<String> {
        Ok(format!("memory://{}?ttl={}", key, ttl.as_secs()))
    }

    async fn probe(&self) -> BlobResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryMetadataIndex {
    buckets: RwLock<BTreeMap<String, Bucket>>,
    files: RwLock<Vec<FileRecord>>,
    fail_file_inserts: AtomicBool,
    fail_file_updates: AtomicBool,
    fail_file_deletes: AtomicBool,
}

impl MemoryMetadataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_file_inserts(&self, fail: bool) {
        self.fail_file_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_file_updates(&self, fail: bool) {
        self.fail_file_updates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_file_deletes(&self, fail: bool) {
        self.fail_file_deletes.store(fail, Ordering::SeqCst);
    }

    fn injected(what: &str) -> IndexError {
        IndexError::Unavailable(format!("injected {} failure", what))
    }
}

#[async_trait]
impl MetadataIndex for MemoryMetadataIndex {
    async fn insert_bucket(&self, bucket: &Bucket) -> IndexResult<()> {
        let mut buckets = self.buckets.write().await;
        if buckets.contains_key(&bucket.name) {
            return Err(IndexError::DuplicateBucket(bucket.name.clone()));
        }
        buckets.insert(bucket.name.clone(), bucket.clone());
        Ok(())
    }

    async fn find_bucket(&self, name: &str) -> IndexResult<Option<Bucket>> {
        Ok(self.buckets.read().await.get(name).cloned())
    }

    async fn list_buckets(&self) -> IndexResult<Vec<Bucket>> {
        Ok(self.buckets.read().await.values().cloned().collect())
    }

    async fn insert_file_record(&self, record: &FileRecord) -> IndexResult<()> {
        if self.fail_file_inserts.load(Ordering::SeqCst) {
            return Err(Self::injected("insert"));
        }
        self.files.write().await.push(record.clone());
        Ok(())
    }

    async fn find_file_record(
        &self,
        bucket: &str,
        file_id: &Uuid,
    ) -> IndexResult<Option<FileRecord>> {
        Ok(self
            .files
            .read()
            .await
            .iter()
            .find(|r| r.bucket_name == bucket && r.file_id == *file_id)
            .cloned())
    }

    async fn find_file_record_by_blob_key(
        &self,
        bucket: &str,
        blob_key: &str,
    ) -> IndexResult<Option<FileRecord>> {
        Ok(self
            .files
            .read()
            .await
            .iter()
            .find(|r| r.bucket_name == bucket && r.blob_key == blob_key)
            .cloned())
    }

    async fn list_file_records(&self, bucket: &str) -> IndexResult<Vec<FileRecord>> {
        Ok(self
            .files
            .read()
            .await
            .iter()
            .filter(|r| r.bucket_name == bucket)
            .cloned()
            .collect())
    }

    async fn update_file_content(
        &self,
        file_id: &Uuid,
        update: &ContentUpdate,
    ) -> IndexResult<Option<FileRecord>> {
        if self.fail_file_updates.load(Ordering::SeqCst) {
            return Err(Self::injected("update"));
        }
        let mut files = self.files.write().await;
        let Some(record) = files.iter_mut().find(|r| r.file_id == *file_id) else {
            return Ok(None);
        };
        if let Some(content_type) = &update.content_type {
            record.content_type = Some(content_type.clone());
        }
        record.size_bytes = update.size_bytes;
        record.etag = Some(update.etag.clone());
        record.updated_at = update.updated_at;
        Ok(Some(record.clone()))
    }

    async fn delete_file_record(&self, bucket: &str, file_id: &Uuid) -> IndexResult<bool> {
        if self.fail_file_deletes.load(Ordering::SeqCst) {
            return Err(Self::injected("delete"));
        }
        let mut files = self.files.write().await;
        let before = files.len();
        files.retain(|r| !(r.bucket_name == bucket && r.file_id == *file_id));
        Ok(files.len() != before)
    }

    async fn ping(&self) -> IndexResult<()> {
        Ok(())
    }
}

/// Gateway wired to fresh in-memory collaborators. The handles are returned
/// so tests can inspect state and inject failures.
pub fn memory_gateway(
    page_size: usize,
) -> (GatewayService, Arc<MemoryBlobStore>, Arc<MemoryMetadataIndex>) {
    let blobs = Arc::new(MemoryBlobStore::new(page_size));
    let index = Arc::new(MemoryMetadataIndex::new());
    let gateway = GatewayService::new(blobs.clone(), index.clone(), 3600);
    (gateway, blobs, index)
}
