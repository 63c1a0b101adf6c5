//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks the metadata index and blob store

use crate::handlers::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// `GET /healthz`
///
/// Liveness probe. Always 200 and never touches storage.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe that:
/// 1. Pings the metadata index.
/// 2. Has the blob store write, read back and remove a scratch blob.
///
/// HTTP 200 when both pass, 503 otherwise, with per-check detail.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let index = state.gateway.check_index().await.map_err(|e| e.to_string());
    let blobs = state.gateway.check_blobs().await.map_err(|e| e.to_string());

    let mut checks = HashMap::new();
    checks.insert("index", CheckStatus::from(index));
    checks.insert("blob_store", CheckStatus::from(blobs));

    let overall_ok = checks.values().all(|c| c.ok);
    if !overall_ok {
        warn!("readiness check failed");
    }

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl From<Result<(), String>> for CheckStatus {
    fn from(result: Result<(), String>) -> Self {
        Self {
            ok: result.is_ok(),
            error: result.err(),
        }
    }
}
