//! SQLite-backed metadata index.
//!
//! Buckets and file records live in two tables created by
//! `migrations/0001_init.sql`. All queries go through the shared sqlx pool.

use crate::{
    models::{bucket::Bucket, file_record::FileRecord},
    services::metadata_index::{ContentUpdate, IndexError, IndexResult, MetadataIndex},
};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const INIT_MIGRATION: &str = include_str!("../../migrations/0001_init.sql");

const FILE_COLUMNS: &str = "file_id, bucket_name, file_name, blob_key, content_type, \
                            size_bytes, etag, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteMetadataIndex {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,
}

impl SqliteMetadataIndex {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Run the embedded schema migration statement by statement.
    ///
    /// Every statement is `IF NOT EXISTS`, so this is safe on every start.
    pub async fn migrate(&self) -> IndexResult<()> {
        let statements = INIT_MIGRATION
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataIndex for SqliteMetadataIndex {
    async fn insert_bucket(&self, bucket: &Bucket) -> IndexResult<()> {
        match sqlx::query("INSERT INTO buckets (name, created_at) VALUES (?, ?)")
            .bind(&bucket.name)
            .bind(bucket.created_at)
            .execute(&*self.db)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(IndexError::DuplicateBucket(bucket.name.clone()))
            }
            Err(err) => Err(IndexError::Sqlx(err)),
        }
    }

    async fn find_bucket(&self, name: &str) -> IndexResult<Option<Bucket>> {
        let bucket = sqlx::query_as::<_, Bucket>(
            "SELECT name, created_at FROM buckets WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&*self.db)
        .await?;
        Ok(bucket)
    }

    async fn list_buckets(&self) -> IndexResult<Vec<Bucket>> {
        let buckets =
            sqlx::query_as::<_, Bucket>("SELECT name, created_at FROM buckets ORDER BY name ASC")
                .fetch_all(&*self.db)
                .await?;
        Ok(buckets)
    }

    async fn insert_file_record(&self, record: &FileRecord) -> IndexResult<()> {
        sqlx::query(
            r#"
            INSERT INTO files (
                file_id, bucket_name, file_name, blob_key, content_type,
                size_bytes, etag, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.file_id)
        .bind(&record.bucket_name)
        .bind(&record.file_name)
        .bind(&record.blob_key)
        .bind(&record.content_type)
        .bind(record.size_bytes)
        .bind(&record.etag)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    async fn find_file_record(
        &self,
        bucket: &str,
        file_id: &Uuid,
    ) -> IndexResult<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE bucket_name = ? AND file_id = ?"
        ))
        .bind(bucket)
        .bind(file_id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    async fn find_file_record_by_blob_key(
        &self,
        bucket: &str,
        blob_key: &str,
    ) -> IndexResult<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE bucket_name = ? AND blob_key = ?"
        ))
        .bind(bucket)
        .bind(blob_key)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    async fn list_file_records(&self, bucket: &str) -> IndexResult<Vec<FileRecord>> {
        let records = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE bucket_name = ? \
             ORDER BY created_at ASC, file_id ASC"
        ))
        .bind(bucket)
        .fetch_all(&*self.db)
        .await?;
        Ok(records)
    }

    async fn update_file_content(
        &self,
        file_id: &Uuid,
        update: &ContentUpdate,
    ) -> IndexResult<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(&format!(
            "UPDATE files SET
                content_type = COALESCE(?, content_type),
                size_bytes = ?,
                etag = ?,
                updated_at = ?
             WHERE file_id = ?
             RETURNING {FILE_COLUMNS}"
        ))
        .bind(&update.content_type)
        .bind(update.size_bytes)
        .bind(&update.etag)
        .bind(update.updated_at)
        .bind(file_id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    async fn delete_file_record(&self, bucket: &str, file_id: &Uuid) -> IndexResult<bool> {
        let result = sqlx::query("DELETE FROM files WHERE bucket_name = ? AND file_id = ?")
            .bind(bucket)
            .bind(file_id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> IndexResult<()> {
        match sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?
        {
            1 => Ok(()),
            other => Err(IndexError::Unavailable(format!(
                "unexpected result: {}",
                other
            ))),
        }
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
