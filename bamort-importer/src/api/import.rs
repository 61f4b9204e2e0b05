//! POST /api/import/import

use axum::{
    extract::{Multipart, Query, State},
    Json,
};

use super::detect::AdapterQuery;
use super::extract::{pick_adapter, read_upload, UserId};
use crate::{error::ApiResult, models::ImportResult, services::ImportRequest, AppState};

/// Import the uploaded file as a new character
///
/// The adapter is detected unless `adapter_id` is given as a query
/// parameter or form field.
pub async fn import(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(query): Query<AdapterQuery>,
    multipart: Multipart,
) -> ApiResult<Json<ImportResult>> {
    let upload = read_upload(
        multipart,
        state.settings.max_upload_bytes,
        state.settings.max_json_depth,
    )
    .await?;

    let request = ImportRequest {
        user_id,
        filename: upload.filename,
        data: upload.data,
        adapter_id: pick_adapter(query.adapter_id, upload.adapter_id),
    };

    let result = state.orchestrator.import(request).await?;
    Ok(Json(result))
}
