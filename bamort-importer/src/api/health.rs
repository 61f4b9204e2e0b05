//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when adapters are registered but none is healthy
    pub status: String,
    /// Module name ("bamort-importer")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    pub git_hash: String,
    pub build_timestamp: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    pub adapters_registered: usize,
    pub adapters_healthy: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let adapters = state.registry.get_all().await;
    let adapters_healthy = adapters.iter().filter(|a| a.healthy).count();
    let status = if !adapters.is_empty() && adapters_healthy == 0 {
        "degraded"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status: status.to_string(),
        module: "bamort-importer".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        uptime_seconds,
        adapters_registered: adapters.len(),
        adapters_healthy,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<crate::AppState> {
    Router::new().route("/health", get(health_check))
}
