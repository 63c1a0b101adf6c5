//! Blob store contract.
//!
//! A [`BlobStore`] holds raw bytes under string keys and reports an integrity
//! tag for each blob. It knows nothing about buckets or file records; those
//! live in the metadata index. Listing follows ListObjectsV2 semantics:
//! prefix filtering, delimiter grouping, opaque continuation tokens.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use std::{io, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("blob `{0}` not found")]
    NotFound(String),
    #[error("invalid blob key `{0}`")]
    InvalidKey(String),
    #[error("invalid continuation token")]
    InvalidToken,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("blob store failure: {0}")]
    Upstream(String),
}

pub type BlobResult<T> = Result<T, BlobStoreError>;

/// Metadata-only view of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMetadata {
    /// Store-computed integrity tag, formatted the way the store reports it
    /// (quoted MD5 hex, like an S3 ETag).
    pub integrity_tag: String,
    pub size_bytes: u64,
}

/// One page of a key enumeration as returned by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobPage {
    pub entries: Vec<String>,
    pub common_prefixes: Vec<String>,
    pub truncated: bool,
    pub next_token: Option<String>,
}

/// Async blob storage contract.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Write `content` under `key`, replacing any previous blob.
    async fn put(&self, key: &str, content: Bytes) -> BlobResult<BlobMetadata>;

    /// Read the full blob at `key`.
    async fn get(&self, key: &str) -> BlobResult<Bytes>;

    /// Delete the blob at `key`. Returns `NotFound` if nothing was there.
    async fn delete(&self, key: &str) -> BlobResult<()>;

    /// Fetch the integrity tag and size without reading content back.
    async fn head_metadata(&self, key: &str) -> BlobResult<BlobMetadata>;

    /// Fetch one page of keys under `prefix`, grouped by `delimiter` when
    /// given. Pass the previous page's `next_token` to continue.
    async fn list_page(
        &self,
        prefix: Option<&str>,
        delimiter: Option<&str>,
        continuation_token: Option<&str>,
    ) -> BlobResult<BlobPage>;

    /// Produce a URL granting read access to `key` for `ttl`.
    async fn signed_url(&self, key: &str, ttl: Duration) -> BlobResult<String>;

    /// Cheap end-to-end check used by readiness probes.
    async fn probe(&self) -> BlobResult<()>;
}

/// Position a continuation token resumes after.
///
/// A page can end on a plain key or on a common prefix; resuming after a
/// prefix must skip every key grouped under it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PageMarker {
    Key(String),
    Prefix(String),
}

impl PageMarker {
    fn encode(&self) -> String {
        let raw = match self {
            PageMarker::Key(key) => format!("k:{}", key),
            PageMarker::Prefix(prefix) => format!("p:{}", prefix),
        };
        general_purpose::URL_SAFE_NO_PAD.encode(raw)
    }

    fn decode(token: &str) -> BlobResult<Self> {
        let raw = general_purpose::URL_SAFE_NO_PAD
            .decode(token)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or(BlobStoreError::InvalidToken)?;
        if let Some(key) = raw.strip_prefix("k:") {
            Ok(PageMarker::Key(key.to_string()))
        } else if let Some(prefix) = raw.strip_prefix("p:") {
            Ok(PageMarker::Prefix(prefix.to_string()))
        } else {
            Err(BlobStoreError::InvalidToken)
        }
    }

    /// True if `key` was already returned (directly or grouped) on an
    /// earlier page.
    fn covers(&self, key: &str) -> bool {
        match self {
            PageMarker::Key(last) => key <= last.as_str(),
            PageMarker::Prefix(prefix) => key <= prefix.as_str() || key.starts_with(prefix),
        }
    }
}

/// Build one page out of an ascending key sequence.
///
/// Stores that can enumerate their keys in order share this so every backend
/// paginates identically. A common prefix counts as a single item against
/// `max_keys`. The page is only marked truncated when at least one more item
/// exists, so the final page never comes back empty-but-truncated.
pub fn paginate_sorted_keys<'a, I>(
    sorted_keys: I,
    prefix: Option<&str>,
    delimiter: Option<&str>,
    continuation_token: Option<&str>,
    max_keys: usize,
) -> BlobResult<BlobPage>
where
    I: IntoIterator<Item = &'a str>,
{
    let resume = continuation_token.map(PageMarker::decode).transpose()?;
    let max_keys = max_keys.max(1);
    let delimiter = delimiter.filter(|d| !d.is_empty());

    let mut page = BlobPage::default();
    let mut last: Option<PageMarker> = None;

    for key in sorted_keys {
        if let Some(prefix) = prefix {
            if !key.starts_with(prefix) {
                continue;
            }
        }
        if resume.as_ref().is_some_and(|marker| marker.covers(key)) {
            continue;
        }

        let item = match delimiter.and_then(|d| compute_common_prefix(key, prefix, d)) {
            Some(common) => {
                if matches!(&last, Some(PageMarker::Prefix(p)) if *p == common) {
                    continue;
                }
                PageMarker::Prefix(common)
            }
            None => PageMarker::Key(key.to_string()),
        };

        if page.entries.len() + page.common_prefixes.len() == max_keys {
            page.truncated = true;
            page.next_token = last.as_ref().map(PageMarker::encode);
            break;
        }

        match &item {
            PageMarker::Key(key) => page.entries.push(key.clone()),
            PageMarker::Prefix(common) => page.common_prefixes.push(common.clone()),
        }
        last = Some(item);
    }

    Ok(page)
}

/// Compute a synthetic "common prefix" for list semantics.
///
/// Returns Some(prefix) if the key belongs to a grouped prefix, otherwise None.
fn compute_common_prefix(
    key: &str,
    requested_prefix: Option<&str>,
    delimiter: &str,
) -> Option<String> {
    let after_prefix = match requested_prefix {
        Some(prefix) => key.strip_prefix(prefix)?,
        None => key,
    };

    let pos = after_prefix.find(delimiter)?;
    let mut combined = String::new();
    if let Some(prefix) = requested_prefix {
        combined.push_str(prefix);
    }
    combined.push_str(&after_prefix[..pos + delimiter.len()]);
    Some(combined)
}
