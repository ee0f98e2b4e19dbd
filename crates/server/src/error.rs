use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use argus_store::StoreError;

/// Errors surfaced through the HTTP API.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Missing or malformed credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Credentials resolved but do not grant this operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Request body failed validation.
    #[error("unprocessable: {0}")]
    Schema(String),

    /// A storage failure the request cannot recover from.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            Self::Schema(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            Self::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            Self::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Self::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}
