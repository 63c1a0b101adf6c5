//! Time-bounded access links, delegated to the blob store.

use crate::services::blob_store::{BlobStore, BlobStoreError};
use std::{sync::Arc, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link ttl must be a positive number of seconds, got {0}")]
    InvalidTtl(i64),
    #[error(transparent)]
    Store(#[from] BlobStoreError),
}

#[derive(Clone)]
pub struct LinkIssuer {
    store: Arc<dyn BlobStore>,
}

impl LinkIssuer {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    pub fn validate_ttl(ttl_seconds: i64) -> Result<Duration, LinkError> {
        u64::try_from(ttl_seconds)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or(LinkError::InvalidTtl(ttl_seconds))
    }

    pub async fn issue_link(&self, blob_key: &str, ttl_seconds: i64) -> Result<String, LinkError> {
        let ttl = Self::validate_ttl(ttl_seconds)?;
        Ok(self.store.signed_url(blob_key, ttl).await?)
    }
}
