//! Wire-visible error envelope and the internal error types that produce it.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced to an HTTP client as the `{error:{...}}` envelope.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("malformed request: {0}")]
    InvalidRequest(String),

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("no inference service available for model {0}")]
    NoServiceAvailable(String),

    #[error("backend failure: {0}")]
    Backend(#[from] BackendError),
}

impl GatewayError {
    fn kind(&self) -> (StatusCode, &'static str, Option<&'static str>) {
        match self {
            GatewayError::InvalidRequest(_) => {
                (StatusCode::BAD_REQUEST, "invalid_request_error", None)
            }
            GatewayError::UnknownModel(_) => {
                (StatusCode::NOT_FOUND, "invalid_request_error", Some("model"))
            }
            GatewayError::NoServiceAvailable(_) => {
                (StatusCode::NOT_FOUND, "invalid_request_error", None)
            }
            GatewayError::Backend(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type")]
    typ: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    param: Option<&'static str>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, typ, param) = self.kind();
        let message = self.to_string();
        log::warn!("request failed: {}", message);
        let body = ErrorBody {
            error: ErrorDetail { message, typ, param },
        };
        (status, Json(body)).into_response()
    }
}

/// Errors raised by an `InferenceBackend` implementation.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend generation failed: {0}")]
    Generation(String),

    #[error("backend canceled")]
    Canceled,
}

/// Errors raised while decoding request bodies (wrapped into `GatewayError::InvalidRequest`).
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid JSON body: {0}")]
    Json(String),
}

impl From<CodecError> for GatewayError {
    fn from(e: CodecError) -> Self {
        GatewayError::InvalidRequest(e.to_string())
    }
}

impl From<axum::extract::rejection::JsonRejection> for CodecError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        CodecError::Json(rejection.body_text())
    }
}

impl From<axum::extract::rejection::JsonRejection> for GatewayError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        CodecError::from(rejection).into()
    }
}
