//! HTTP handlers for bucket and file operations.
//! Uploads arrive as multipart forms with the content in a `file` field;
//! everything else is JSON in and JSON out, except downloads.

use crate::{
    errors::AppError,
    handlers::{AppState, respond},
    models::file_record::FileRecord,
    services::gateway::{FileRef, UpdateStatus, Verification},
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Name of the multipart field that carries file content.
const FILE_FIELD: &str = "file";

/// Request body for `POST /buckets`.
#[derive(Debug, Deserialize)]
pub struct CreateBucketReq {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LinkQuery {
    pub ttl: Option<i64>,
}

#[derive(Debug, Serialize)]
struct UploadData {
    file: FileRecord,
    verification: Verification,
}

#[derive(Debug, Serialize)]
struct UpdateData {
    status: UpdateStatus,
    file: FileRecord,
    verification: Option<Verification>,
}

#[derive(Debug, Serialize)]
struct LinkData {
    file_id: String,
    url: String,
}

#[derive(Debug, Serialize)]
struct OrphanData {
    bucket: String,
    orphaned_blob_keys: Vec<String>,
}

/// The `file` part of a multipart upload.
struct UploadedFile {
    file_name: String,
    content_type: Option<String>,
    content: Bytes,
}

/// Pull the `file` field out of a multipart body, skipping any other field.
async fn read_file_field(mut multipart: Multipart) -> Result<UploadedFile, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            debug!("ignoring multipart field {:?}", field.name());
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let content = field.bytes().await?;
        return Ok(UploadedFile {
            file_name,
            content_type,
            content,
        });
    }
    Err(AppError::bad_request(format!(
        "multipart field `{}` is required",
        FILE_FIELD
    )))
}

/// POST `/buckets`
pub async fn create_bucket(
    State(state): State<AppState>,
    Json(payload): Json<CreateBucketReq>,
) -> Result<impl IntoResponse, AppError> {
    let bucket = state.gateway.create_bucket(&payload.name).await?;
    Ok(respond(
        StatusCode::CREATED,
        format!("bucket {} created", bucket.name),
        bucket,
    ))
}

/// GET `/buckets`
pub async fn list_buckets(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let buckets = state.gateway.list_buckets().await?;
    Ok(respond(
        StatusCode::OK,
        format!("{} buckets", buckets.len()),
        buckets,
    ))
}

/// POST `/buckets/{bucket}/files`
pub async fn upload_file(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let upload = read_file_field(multipart).await?;
    let outcome = state
        .gateway
        .upload_file(&bucket, &upload.file_name, upload.content_type, upload.content)
        .await?;
    let message = if outcome.verification.is_confirmed() {
        format!("uploaded {}", outcome.record.file_name)
    } else {
        format!("uploaded {} (not yet visible in listing)", outcome.record.file_name)
    };
    Ok(respond(
        StatusCode::CREATED,
        message,
        UploadData {
            file: outcome.record,
            verification: outcome.verification,
        },
    ))
}

/// GET `/buckets/{bucket}/files`
pub async fn list_files(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let files = state.gateway.list_files(&bucket).await?;
    Ok(respond(
        StatusCode::OK,
        format!("{} files in {}", files.len(), bucket),
        files,
    ))
}

/// GET `/buckets/{bucket}/files/{file_id}`: the stored bytes as an attachment.
pub async fn download_file(
    State(state): State<AppState>,
    Path((bucket, file_id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let download = state.gateway.download_file(&bucket, &file_id).await?;

    let mut response = Response::new(Body::empty());
    set_file_headers(
        response.headers_mut(),
        &download.record,
        download.content.len(),
    );
    *response.body_mut() = Body::from(download.content);
    *response.status_mut() = StatusCode::OK;
    Ok(response)
}

/// PUT `/buckets/{bucket}/files/{file_id}`
pub async fn update_file(
    State(state): State<AppState>,
    Path((bucket, file_id)): Path<(String, String)>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    update(state, bucket, FileRef::Id(file_id), multipart).await
}

/// PUT `/buckets/{bucket}/keys/{*key}`: same as [`update_file`] but the file
/// is named by its blob key.
pub async fn update_file_by_key(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    update(state, bucket, FileRef::BlobKey(key), multipart).await
}

async fn update(
    state: AppState,
    bucket: String,
    file: FileRef,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let upload = read_file_field(multipart).await?;
    let outcome = state
        .gateway
        .update_file(&bucket, file, upload.content_type, upload.content)
        .await?;
    let message = match outcome.status {
        UpdateStatus::Unchanged => "content unchanged",
        UpdateStatus::Updated => "content updated",
    };
    Ok(respond(
        StatusCode::OK,
        message,
        UpdateData {
            status: outcome.status,
            file: outcome.record,
            verification: outcome.verification,
        },
    ))
}

/// DELETE `/buckets/{bucket}/files/{file_id}`
pub async fn delete_file(
    State(state): State<AppState>,
    Path((bucket, file_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let record = state.gateway.delete_file(&bucket, &file_id).await?;
    Ok(respond(
        StatusCode::OK,
        format!("deleted {}", record.file_name),
        record,
    ))
}

/// GET `/buckets/{bucket}/files/{file_id}/link?ttl=`
pub async fn file_link(
    State(state): State<AppState>,
    Path((bucket, file_id)): Path<(String, String)>,
    Query(q): Query<LinkQuery>,
) -> Result<impl IntoResponse, AppError> {
    let url = state.gateway.file_link(&bucket, &file_id, q.ttl).await?;
    Ok(respond(StatusCode::OK, "link issued", LinkData { file_id, url }))
}

/// GET `/buckets/{bucket}/orphans`
pub async fn list_orphans(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let orphaned_blob_keys = state.gateway.find_orphaned_blobs(&bucket).await?;
    Ok(respond(
        StatusCode::OK,
        format!("{} orphaned blobs", orphaned_blob_keys.len()),
        OrphanData {
            bucket,
            orphaned_blob_keys,
        },
    ))
}

fn set_file_headers(headers: &mut HeaderMap, record: &FileRecord, length: usize) {
    let content_type = record
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    let disposition = format!(
        "attachment; filename=\"{}\"",
        record.file_name.replace(['"', '\\'], "_")
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition)
            .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
    );

    if let Some(etag) = record.etag.as_ref() {
        let quoted = format!("\"{}\"", etag);
        if let Ok(value) = HeaderValue::from_str(&quoted) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(&record.updated_at.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
