//! Error types for bamort-importer
//!
//! Every handler error becomes a JSON body of the form
//! `{"error": {"code": ..., "message": ..., <details>}}`.

use crate::adapters::AdapterError;
use crate::security::SecurityError;
use crate::services::{ExportError, ImportError};
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use std::time::Duration;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Export(#[from] ExportError),

    /// bamort-common error
    #[error("Common error: {0}")]
    Common(#[from] bamort_common::Error),
}

struct Rendered {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Map<String, Value>,
    retry_after: Option<Duration>,
}

impl Rendered {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: Map::new(),
            retry_after: None,
        }
    }

    fn with(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }
}

fn security(err: &SecurityError) -> Rendered {
    let message = err.to_string();
    match err {
        SecurityError::RateLimited { retry_after } => {
            let mut rendered = Rendered::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", message)
                .with("retry_after_seconds", json!(retry_after.as_secs()));
            rendered.retry_after = Some(*retry_after);
            rendered
        }
        SecurityError::FileTooLarge { limit } => {
            Rendered::new(StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE", message).with("limit_bytes", json!(limit))
        }
        SecurityError::JsonTooDeep { max } => {
            Rendered::new(StatusCode::BAD_REQUEST, "JSON_TOO_DEEP", message).with("max_depth", json!(max))
        }
        SecurityError::InvalidJson(_) => Rendered::new(StatusCode::BAD_REQUEST, "INVALID_JSON", message),
        SecurityError::InvalidUrl(_) | SecurityError::HostRejected { .. } => {
            Rendered::new(StatusCode::BAD_REQUEST, "HOST_REJECTED", message)
        }
        SecurityError::MissingUser => Rendered::new(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", message),
    }
}

fn adapter(err: &AdapterError) -> Rendered {
    let message = err.to_string();
    match err {
        AdapterError::MissingField(_) => Rendered::new(StatusCode::BAD_REQUEST, "INVALID_ADAPTER", message),
        AdapterError::NotFound(_) => Rendered::new(StatusCode::NOT_FOUND, "ADAPTER_NOT_FOUND", message),
        AdapterError::Unhealthy(_) => Rendered::new(StatusCode::SERVICE_UNAVAILABLE, "ADAPTER_UNHEALTHY", message),
        AdapterError::MissingCapability { .. } => {
            Rendered::new(StatusCode::CONFLICT, "CAPABILITY_MISSING", message)
        }
        AdapterError::NoneAvailable => Rendered::new(StatusCode::SERVICE_UNAVAILABLE, "NO_ADAPTERS", message),
        AdapterError::BelowThreshold { best, threshold } => {
            Rendered::new(StatusCode::UNPROCESSABLE_ENTITY, "FORMAT_NOT_DETECTED", message)
                .with("best_confidence", json!(best))
                .with("threshold", json!(threshold))
                .with("hint", json!("Specify adapter_id to choose an adapter explicitly"))
        }
        AdapterError::Transport(_) | AdapterError::Status { .. } | AdapterError::Decode(_) => {
            Rendered::new(StatusCode::BAD_GATEWAY, "ADAPTER_ERROR", message)
        }
        AdapterError::Rejected(inner) => security(inner),
    }
}

fn common(err: &bamort_common::Error) -> Rendered {
    match err {
        bamort_common::Error::NotFound(msg) => Rendered::new(StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
        bamort_common::Error::InvalidInput(msg) => Rendered::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        other => Rendered::new(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", other.to_string()),
    }
}

impl ApiError {
    fn render(&self) -> Rendered {
        match self {
            ApiError::NotFound(msg) => Rendered::new(StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::BadRequest(msg) => Rendered::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Internal(msg) => Rendered::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone()),
            ApiError::Security(err) => security(err),
            ApiError::Adapter(err) => adapter(err),
            ApiError::Common(err) => common(err),

            ApiError::Import(err) => match err {
                ImportError::Adapter(inner) => adapter(inner),
                ImportError::Validation(report) => {
                    Rendered::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", err.to_string())
                        .with("errors", json!(report.errors))
                        .with("warnings", json!(report.warnings))
                }
                ImportError::Storage(inner) => common(inner),
                ImportError::Compression(_) => {
                    Rendered::new(StatusCode::INTERNAL_SERVER_ERROR, "IMPORT_FAILED", err.to_string())
                }
                ImportError::Failed { import_id, .. } => {
                    Rendered::new(StatusCode::INTERNAL_SERVER_ERROR, "IMPORT_FAILED", err.to_string())
                        .with("import_id", json!(import_id))
                }
                ImportError::Panicked { import_id, .. } => {
                    Rendered::new(StatusCode::INTERNAL_SERVER_ERROR, "IMPORT_FAILED", err.to_string())
                        .with("import_id", json!(import_id))
                }
            },

            ApiError::Export(err) => match err {
                ExportError::CharacterNotFound(_) => {
                    Rendered::new(StatusCode::NOT_FOUND, "CHARACTER_NOT_FOUND", err.to_string())
                }
                ExportError::NoAdapter => Rendered::new(StatusCode::BAD_REQUEST, "NO_ADAPTER", err.to_string())
                    .with("hint", json!("Specify adapter_id query parameter")),
                ExportError::AdapterUnavailable { available, .. } => {
                    Rendered::new(StatusCode::CONFLICT, "ADAPTER_UNAVAILABLE", err.to_string())
                        .with("available_adapters", json!(available))
                }
                ExportError::AdapterUnhealthy(_) => {
                    Rendered::new(StatusCode::CONFLICT, "ADAPTER_UNHEALTHY", err.to_string())
                }
                ExportError::Adapter(inner) => adapter(inner),
                ExportError::Storage(inner) => common(inner),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let rendered = self.render();
        if rendered.status.is_server_error() {
            tracing::error!(code = rendered.code, error = %rendered.message, "Request failed");
        }

        let mut error = Map::new();
        error.insert("code".to_string(), json!(rendered.code));
        error.insert("message".to_string(), json!(rendered.message));
        error.extend(rendered.details);

        let mut response = (rendered.status, Json(json!({ "error": error }))).into_response();
        if let Some(retry_after) = rendered.retry_after {
            if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().max(1).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
