//! Core data models for the object gateway.
//!
//! Buckets and file records map to index tables via `sqlx::FromRow` and
//! serialize as JSON via `serde`. Listing types are never persisted.

pub mod bucket;
pub mod file_record;
pub mod listing;
