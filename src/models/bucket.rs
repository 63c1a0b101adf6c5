//! Represents a logical bucket, a flat top-level container for files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A storage bucket.
///
/// Buckets are identified by their name alone. Names are case-sensitive and
/// carry no implicit hierarchy; a `/` is never part of a valid name.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct Bucket {
    /// Unique bucket name (primary key in the index).
    pub name: String,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,
}

impl Bucket {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}
