//! POST /api/import/detect

use axum::{
    extract::{Multipart, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::extract::{pick_adapter, read_upload, UserId};
use crate::{error::ApiResult, models::DetectionMethod, AppState};

/// Optional adapter override accepted by the upload endpoints
#[derive(Debug, Default, Deserialize)]
pub struct AdapterQuery {
    pub adapter_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub adapter_id: String,
    pub confidence: f64,
    pub method: DetectionMethod,
    /// Display name of the chosen adapter
    pub suggested_adapter_name: Option<String>,
}

/// Detect which adapter handles the uploaded file
pub async fn detect(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(query): Query<AdapterQuery>,
    multipart: Multipart,
) -> ApiResult<Json<DetectResponse>> {
    let upload = read_upload(
        multipart,
        state.settings.max_upload_bytes,
        state.settings.max_json_depth,
    )
    .await?;
    let specified = pick_adapter(query.adapter_id, upload.adapter_id);

    let detection = state
        .detector
        .detect(&upload.data, &upload.filename, specified.as_deref())
        .await?;

    tracing::info!(
        user_id = %user_id,
        filename = %upload.filename,
        adapter_id = %detection.adapter_id,
        confidence = detection.confidence,
        method = ?detection.method,
        "Format detected"
    );

    let suggested_adapter_name = state.registry.get(&detection.adapter_id).await.map(|a| a.name);
    Ok(Json(DetectResponse {
        adapter_id: detection.adapter_id,
        confidence: detection.confidence,
        method: detection.method,
        suggested_adapter_name,
    }))
}
