//! GET /api/import/adapters

use axum::{extract::State, Json};
use serde::Serialize;

use super::extract::UserId;
use crate::{models::AdapterMetadata, AppState};

#[derive(Debug, Serialize)]
pub struct AdapterListResponse {
    pub adapters: Vec<AdapterMetadata>,
    pub count: usize,
}

/// Healthy adapters only
pub async fn list_adapters(State(state): State<AppState>, _user: UserId) -> Json<AdapterListResponse> {
    let adapters = state.registry.get_healthy().await;
    Json(AdapterListResponse {
        count: adapters.len(),
        adapters,
    })
}
