//! Request extraction shared by the handlers
//!
//! The caller's identity arrives in the `X-User-Id` header, set by the
//! gateway in front of this service.

use crate::error::{ApiError, ApiResult};
use crate::security::upload_limit::{read_field_limited, FieldReadError};
use crate::security::{check_json_depth, looks_like_json, RateLimiter, SecurityError};
use axum::{
    async_trait,
    body::Bytes,
    extract::{multipart::MultipartError, FromRequestParts, Multipart, Request, State},
    http::{request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Header carrying the authenticated user id
pub const USER_ID_HEADER: &str = "x-user-id";

/// Longest accepted `adapter_id` form value
const MAX_ADAPTER_ID_BYTES: usize = 256;

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

fn user_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_from_headers(&parts.headers)
            .map(UserId)
            .ok_or(ApiError::Security(SecurityError::MissingUser))
    }
}

/// Per-user rate limit, applied with `middleware::from_fn_with_state`
pub async fn rate_limited(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id = user_from_headers(request.headers()).ok_or(SecurityError::MissingUser)?;
    limiter.check(&user_id)?;
    Ok(next.run(request).await)
}

/// Uploaded file plus the optional adapter override
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub data: Bytes,
    pub adapter_id: Option<String>,
}

/// Read the `file` and `adapter_id` multipart fields under the upload guards
///
/// The file is refused once it exceeds `max_bytes`; content that looks like
/// JSON must also nest no deeper than `max_json_depth`.
pub async fn read_upload(
    mut multipart: Multipart,
    max_bytes: usize,
    max_json_depth: usize,
) -> ApiResult<Upload> {
    let mut file: Option<(String, Bytes)> = None;
    let mut adapter_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        match field.name() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "upload".to_string());
                let data = read_field_limited(field, max_bytes)
                    .await
                    .map_err(|e| field_error(e, max_bytes))?;
                file = Some((filename, data));
            }
            Some("adapter_id") => {
                let raw = read_field_limited(field, MAX_ADAPTER_ID_BYTES)
                    .await
                    .map_err(|e| field_error(e, max_bytes))?;
                let value = String::from_utf8_lossy(&raw).trim().to_string();
                if !value.is_empty() {
                    adapter_id = Some(value);
                }
            }
            _ => {}
        }
    }

    let (filename, data) = file.ok_or_else(|| ApiError::BadRequest("No file uploaded".to_string()))?;
    if data.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }
    if looks_like_json(&data) {
        check_json_depth(&data, max_json_depth)?;
    }

    Ok(Upload {
        filename,
        data,
        adapter_id,
    })
}

fn field_error(err: FieldReadError, max_bytes: usize) -> ApiError {
    match err {
        FieldReadError::Limit(e) => ApiError::Security(e),
        FieldReadError::Multipart(e) => multipart_error(e, max_bytes),
    }
}

// The request body limit surfaces as a multipart error
fn multipart_error(err: MultipartError, max_bytes: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::Security(SecurityError::FileTooLarge { limit: max_bytes });
    }
    ApiError::BadRequest(format!("Malformed multipart body: {}", err))
}

/// Query parameter value wins over the form field
pub fn pick_adapter(query: Option<String>, form: Option<String>) -> Option<String> {
    query
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .or(form)
}
