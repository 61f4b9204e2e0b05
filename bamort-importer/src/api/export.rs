//! POST /api/import/export/:id

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};

use super::detect::AdapterQuery;
use super::extract::UserId;
use crate::{
    error::{ApiError, ApiResult},
    AppState,
};

/// Export a stored character as an attachment download
pub async fn export_character(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(character_id): Path<i64>,
    Query(query): Query<AdapterQuery>,
) -> ApiResult<Response> {
    let file = state
        .exporter
        .export(&user_id, character_id, query.adapter_id.as_deref())
        .await?;

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file.filename))
        .map_err(|e| ApiError::Internal(format!("Invalid export filename: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.content,
    )
        .into_response())
}
