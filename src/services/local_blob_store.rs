//! src/services/local_blob_store.rs
//!
//! LocalBlobStore keeps blob payloads on local disk beneath `base_path/{key}`.
//! Writes go through a temp file that is fsynced and renamed into place, so
//! readers never observe a half-written blob. Integrity tags are MD5 over the
//! stored bytes; links are signed by a [`UrlSigner`] and served back by the
//! gateway's `/blobs` route.

use crate::services::{
    blob_store::{BlobMetadata, BlobPage, BlobResult, BlobStore, BlobStoreError, paginate_sorted_keys},
    signing::UrlSigner,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

const MAX_BLOB_KEY_LEN: usize = 1024;
const TEMP_FILE_PREFIX: &str = ".tmp-";
const PROBE_FILE_PREFIX: &str = ".probe-";
const READ_CHUNK_SIZE: usize = 4096;

#[derive(Clone, Debug)]
pub struct LocalBlobStore {
    /// Base directory on disk where blob payloads are stored.
    base_path: PathBuf,
    signer: UrlSigner,
    page_size: usize,
}

impl LocalBlobStore {
    pub fn new(base_path: impl Into<PathBuf>, signer: UrlSigner, page_size: usize) -> Self {
        Self {
            base_path: base_path.into(),
            signer,
            page_size: page_size.clamp(1, 1000),
        }
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    ///
    /// Rejects keys that begin with `/`, have empty, `.` or `..` segments,
    /// and any key that could collide with the store's own scratch files.
    /// Dots inside a segment (`report..v2.txt`) are fine.
    fn ensure_key_safe(key: &str) -> BlobResult<()> {
        let invalid = || BlobStoreError::InvalidKey(key.to_string());
        if key.is_empty() || key.len() > MAX_BLOB_KEY_LEN {
            return Err(invalid());
        }
        if key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(invalid());
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(invalid());
        }
        if key
            .split('/')
            .any(|segment| segment.starts_with(TEMP_FILE_PREFIX) || segment.starts_with(PROBE_FILE_PREFIX))
        {
            return Err(invalid());
        }
        Ok(())
    }

    /// Listing prefixes follow the same rules as keys, except that they may
    /// be empty or end with `/`.
    fn ensure_prefix_safe(prefix: &str) -> BlobResult<()> {
        let trimmed = prefix.trim_end_matches('/');
        if trimmed.is_empty() {
            return if prefix.is_empty() {
                Ok(())
            } else {
                Err(BlobStoreError::InvalidKey(prefix.to_string()))
            };
        }
        Self::ensure_key_safe(trimmed)
            .map_err(|_| BlobStoreError::InvalidKey(prefix.to_string()))
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        let mut path = self.base_path.clone();
        path.extend(key.split('/'));
        path
    }

    fn not_found(key: &str) -> impl FnOnce(io::Error) -> BlobStoreError + '_ {
        move |err| {
            if err.kind() == ErrorKind::NotFound {
                BlobStoreError::NotFound(key.to_string())
            } else {
                BlobStoreError::Io(err)
            }
        }
    }

    /// Collect every stored key at or below the directory implied by
    /// `prefix`, in ascending order.
    async fn collect_keys(&self, prefix: Option<&str>) -> BlobResult<Vec<String>> {
        let start = match prefix.and_then(|p| p.rfind('/').map(|pos| &p[..pos])) {
            Some(dir) => self.blob_path(dir),
            None => self.base_path.clone(),
        };

        let mut keys = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) if err.kind() == ErrorKind::NotADirectory => continue,
                Err(err) => return Err(BlobStoreError::Io(err)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    debug!("skipping non-UTF-8 entry in {}", dir.display());
                    continue;
                };
                if name.starts_with(TEMP_FILE_PREFIX) || name.starts_with(PROBE_FILE_PREFIX) {
                    continue;
                }
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    // only list what get/head/signed_url will accept
                    match self.key_for(&entry.path()) {
                        Some(key) if Self::ensure_key_safe(&key).is_ok() => keys.push(key),
                        _ => debug!("skipping unaddressable file {}", entry.path().display()),
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let segments = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        Some(segments.join("/"))
    }

    /// Recursively remove empty directories up to the store root.
    ///
    /// Stops when:
    /// - directory not empty
    /// - directory not found
    /// - reached root
    /// - encountered unexpected I/O errors
    async fn prune_empty_dirs(&self, start: &Path) {
        let stop = self.base_path.as_path();
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
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

#[async_trait]
impl BlobStore for LocalBlobStore {
    /// Write bytes to a temp file, fsync, then atomically rename into place.
    /// Cleans up the temp file on errors.
    async fn put(&self, key: &str, content: Bytes) -> BlobResult<BlobMetadata> {
        Self::ensure_key_safe(key)?;
        let file_path = self.blob_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            BlobStoreError::Io(io::Error::new(
                ErrorKind::Other,
                "blob path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!("{}{}", TEMP_FILE_PREFIX, Uuid::new_v4()));

        let write = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(&content).await?;
            file.flush().await?;
            file.sync_all().await
        };
        if let Err(err) = write.await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlobStoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(BlobStoreError::Io(err));
            }
        }

        debug!("wrote {} bytes to {}", content.len(), file_path.display());
        Ok(BlobMetadata {
            integrity_tag: format!("\"{:x}\"", md5::compute(&content)),
            size_bytes: content.len() as u64,
        })
    }

    async fn get(&self, key: &str) -> BlobResult<Bytes> {
        Self::ensure_key_safe(key)?;
        let content = fs::read(self.blob_path(key))
            .await
            .map_err(Self::not_found(key))?;
        Ok(Bytes::from(content))
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        Self::ensure_key_safe(key)?;
        let file_path = self.blob_path(key);
        fs::remove_file(&file_path)
            .await
            .map_err(Self::not_found(key))?;
        debug!("removed blob file {}", file_path.display());

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    /// Streams the stored file through MD5 instead of trusting any cached
    /// value, so the tag always reflects what is on disk.
    async fn head_metadata(&self, key: &str) -> BlobResult<BlobMetadata> {
        Self::ensure_key_safe(key)?;
        let file = File::open(self.blob_path(key))
            .await
            .map_err(Self::not_found(key))?;

        let mut digest = Context::new();
        let mut size_bytes: u64 = 0;
        let mut chunks = ReaderStream::with_capacity(file, READ_CHUNK_SIZE);
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            size_bytes += chunk.len() as u64;
            digest.consume(&chunk);
        }

        Ok(BlobMetadata {
            integrity_tag: format!("\"{:x}\"", digest.compute()),
            size_bytes,
        })
    }

    async fn list_page(
        &self,
        prefix: Option<&str>,
        delimiter: Option<&str>,
        continuation_token: Option<&str>,
    ) -> BlobResult<BlobPage> {
        if let Some(prefix) = prefix {
            Self::ensure_prefix_safe(prefix)?;
        }
        let keys = self.collect_keys(prefix).await?;
        let page = paginate_sorted_keys(
            keys.iter().map(String::as_str),
            prefix,
            delimiter,
            continuation_token,
            self.page_size,
        )?;
        debug!(
            "listed {} entries and {} prefixes under {:?} (truncated: {})",
            page.entries.len(),
            page.common_prefixes.len(),
            prefix,
            page.truncated
        );
        Ok(page)
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> BlobResult<String> {
        Self::ensure_key_safe(key)?;
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp().saturating_add(ttl_secs);
        Ok(self.signer.signed_url(key, expires_at))
    }

    /// Best-effort write/read/delete of a scratch file under the store root.
    async fn probe(&self) -> BlobResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self
            .base_path
            .join(format!("{}{}", PROBE_FILE_PREFIX, Uuid::new_v4()));
        fs::write(&tmp_path, b"probe").await?;
        let read_back = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if read_back? != b"probe" {
            return Err(BlobStoreError::Upstream("probe content mismatch".into()));
        }
        Ok(())
    }
}
