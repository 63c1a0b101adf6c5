//! Content fingerprinting and the overwrite decision.
//!
//! An update only reaches the blob store when the candidate content hashes
//! differently from what the store already holds for that key.

use crate::services::blob_store::{BlobStore, BlobStoreError};
use serde::Serialize;
use std::{fmt, io::SeekFrom, sync::Arc};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// Fixed read size for fingerprinting.
const FINGERPRINT_CHUNK_SIZE: usize = 4096;

/// Normalized content fingerprint: lowercase MD5 hex, no quotes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct IntegrityTag(String);

impl IntegrityTag {
    /// Normalize a tag as reported by a store, e.g. `"5eb6..."` with quotes.
    pub fn from_store(raw: &str) -> Self {
        Self(raw.trim().trim_matches('"').to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IntegrityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of comparing candidate content with the stored tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverwriteDecision {
    /// Fingerprint of the candidate content.
    pub tag: IntegrityTag,
    /// Whether writing the candidate would change stored content.
    pub changed: bool,
}

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("integrity lookup for `{key}` failed: {source}")]
    LookupFailed {
        key: String,
        #[source]
        source: BlobStoreError,
    },
    #[error("failed to read candidate content: {0}")]
    Read(#[from] std::io::Error),
}

/// Hash `content` from its current position to the end, then rewind it to
/// the start so the caller can read it again.
pub async fn fingerprint<R>(content: &mut R) -> std::io::Result<IntegrityTag>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    let mut digest = md5::Context::new();
    let mut chunk = [0u8; FINGERPRINT_CHUNK_SIZE];
    loop {
        let read = content.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        digest.consume(&chunk[..read]);
    }
    content.seek(SeekFrom::Start(0)).await?;
    Ok(IntegrityTag(format!("{:x}", digest.compute())))
}

/// Decide whether `content` should replace the blob tagged `existing`.
///
/// No existing tag means there is nothing to compare against, so the content
/// always counts as changed.
pub async fn should_overwrite<R>(
    existing: Option<&IntegrityTag>,
    content: &mut R,
) -> std::io::Result<OverwriteDecision>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    let tag = fingerprint(content).await?;
    let changed = existing.is_none_or(|existing| *existing != tag);
    Ok(OverwriteDecision { tag, changed })
}

/// Runs [`should_overwrite`] against the tag the store reports for a key.
#[derive(Clone)]
pub struct IntegrityEngine {
    store: Arc<dyn BlobStore>,
}

impl IntegrityEngine {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Current tag for `key`, or `None` if no blob exists there.
    pub async fn existing_tag(&self, key: &str) -> Result<Option<IntegrityTag>, IntegrityError> {
        match self.store.head_metadata(key).await {
            Ok(meta) => Ok(Some(IntegrityTag::from_store(&meta.integrity_tag))),
            Err(BlobStoreError::NotFound(_)) => Ok(None),
            Err(source) => Err(IntegrityError::LookupFailed {
                key: key.to_string(),
                source,
            }),
        }
    }

    /// Compare `content` with whatever is stored at `key`. Never writes.
    pub async fn evaluate<R>(
        &self,
        key: &str,
        content: &mut R,
    ) -> Result<OverwriteDecision, IntegrityError>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send,
    {
        let existing = self.existing_tag(key).await?;
        Ok(should_overwrite(existing.as_ref(), content).await?)
    }
}
