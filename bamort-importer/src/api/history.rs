//! GET /api/import/history, GET /api/import/history/:id

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::extract::UserId;
use crate::{
    db::history,
    error::{ApiError, ApiResult},
    models::{ImportHistory, MasterDataImport},
    AppState,
};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl HistoryQuery {
    /// Page number and page size after defaults and clamping
    pub fn resolve(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = match self.per_page {
            Some(n) if n >= 1 => n.min(MAX_PER_PAGE),
            _ => DEFAULT_PER_PAGE,
        };
        (page, per_page)
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryPage {
    pub histories: Vec<ImportHistory>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub pages: i64,
}

#[derive(Debug, Serialize)]
pub struct HistoryDetail {
    pub history: ImportHistory,
    pub master_data_imports: Vec<MasterDataImport>,
}

/// The caller's imports, newest first
pub async fn list_history(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryPage>> {
    let (page, per_page) = query.resolve();
    let (histories, total) = history::list_for_user(&state.db, &user_id, page, per_page).await?;
    let per_page_i64 = i64::from(per_page);

    Ok(Json(HistoryPage {
        histories,
        total,
        page,
        per_page,
        pages: (total + per_page_i64 - 1) / per_page_i64,
    }))
}

/// One import with its provenance rows
pub async fn get_history(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(id): Path<i64>,
) -> ApiResult<Json<HistoryDetail>> {
    let history = history::get_for_user(&state.db, id, &user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Import {} not found", id)))?;
    let master_data_imports = history::master_data_for(&state.db, id).await?;

    Ok(Json(HistoryDetail {
        history,
        master_data_imports,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults_and_clamping() {
        let q = |page, per_page| HistoryQuery { page, per_page }.resolve();
        assert_eq!(q(None, None), (1, 20));
        assert_eq!(q(Some(0), Some(0)), (1, 20));
        assert_eq!(q(Some(3), Some(500)), (3, 100));
        assert_eq!(q(Some(2), Some(5)), (2, 5));
    }
}
