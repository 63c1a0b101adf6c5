//! Listing endpoints over the raw blob namespace, plus the download target
//! for signed links.

use crate::{
    errors::AppError,
    handlers::{AppState, respond},
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct PrefixQuery {
    pub prefix: Option<String>,
}

impl PrefixQuery {
    /// An empty `?prefix=` lists from the root.
    fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref().filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: i64,
    pub signature: String,
}

/// GET `/list/files?prefix=`: one level, all pages merged.
pub async fn list_hierarchy(
    State(state): State<AppState>,
    Query(q): Query<PrefixQuery>,
) -> Result<impl IntoResponse, AppError> {
    let listing = state.gateway.collect_hierarchy(q.prefix()).await?;
    Ok(respond(
        StatusCode::OK,
        format!(
            "{} files, {} prefixes",
            listing.files.len(),
            listing.prefixes.len()
        ),
        listing,
    ))
}

/// GET `/list/files/v2?prefix=`: top level plus everything under each
/// prefix, with public links.
pub async fn list_tree(
    State(state): State<AppState>,
    Query(q): Query<PrefixQuery>,
) -> Result<impl IntoResponse, AppError> {
    let tree = state.gateway.list_tree(q.prefix()).await?;
    Ok(respond(
        StatusCode::OK,
        format!("{} files", tree.files.len()),
        tree,
    ))
}

/// GET `/blobs/{*key}?expires=&signature=`
pub async fn download_signed_blob(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(q): Query<SignedQuery>,
) -> Result<Response, AppError> {
    state
        .signer
        .verify(&key, q.expires, &q.signature, Utc::now().timestamp())?;
    debug!("serving signed blob {}", key);

    let content = state.gateway.fetch_blob(&key).await?;
    let mut response = Response::new(Body::from(content));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    *response.status_mut() = StatusCode::OK;
    Ok(response)
}
