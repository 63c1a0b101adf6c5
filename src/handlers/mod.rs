//! HTTP handlers. Each one extracts request data, calls the gateway and
//! wraps the result in the JSON envelope.

pub mod file_handlers;
pub mod health_handlers;
pub mod listing_handlers;

use crate::services::{gateway::GatewayService, signing::UrlSigner};
use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub gateway: GatewayService,
    /// Verifies links served by `/blobs`.
    pub signer: UrlSigner,
}

/// Success envelope: `{"status":"success","message":…,"data":…}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: &'static str,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success",
            message: message.into(),
            data,
        }
    }
}

/// `(status, Json(envelope))` in one call.
pub fn respond<T: Serialize>(
    status: StatusCode,
    message: impl Into<String>,
    data: T,
) -> impl IntoResponse {
    (status, Json(Envelope::success(message, data)))
}
