use crate::services::{gateway::GatewayError, signing::SignatureError};
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Error surfaced to HTTP clients as `{"status":"error","error":code,"message"}`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status, code and message.
    pub fn new(status: StatusCode, code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "InvalidArgument", msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "status": "error",
            "error": self.code,
            "message": self.message,
        }));

        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::new(err.status(), "InvalidArgument", err.body_text())
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        let (status, code) = match &err {
            GatewayError::BucketNotFound(_) => (StatusCode::NOT_FOUND, "BucketNotFound"),
            GatewayError::BucketAlreadyExists(_) => (StatusCode::CONFLICT, "BucketExists"),
            GatewayError::FileNotFound { .. } => (StatusCode::NOT_FOUND, "FileNotFound"),
            GatewayError::FileNotOnDisk { .. } => (StatusCode::NOT_FOUND, "FileNotOnDisk"),
            GatewayError::BlobNotFound(_) => (StatusCode::NOT_FOUND, "BlobNotFound"),
            GatewayError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "InvalidArgument"),
            GatewayError::LookupFailed { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "LookupFailed")
            }
            GatewayError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UpstreamFailure"),
            GatewayError::MetadataWriteFailed { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "MetadataWriteFailed")
            }
            GatewayError::MetadataDeleteFailed { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "MetadataDeleteFailed")
            }
        };
        AppError::new(status, code, err.to_string())
    }
}

impl From<SignatureError> for AppError {
    fn from(err: SignatureError) -> Self {
        let code = match err {
            SignatureError::Expired => "LinkExpired",
            SignatureError::Mismatch => "SignatureMismatch",
        };
        AppError::new(StatusCode::FORBIDDEN, code, err.to_string())
    }
}
