//! bamort-importer library interface
//!
//! Exposes the application state and router so integration tests can drive
//! the HTTP surface without binding a socket.

pub mod adapters;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod security;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use crate::adapters::AdapterRegistry;
use crate::config::ImporterSettings;
use crate::security::RateLimits;
use crate::services::{Detector, Exporter, ImportOrchestrator, Validator};
use axum::{extract::DefaultBodyLimit, Router};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Multipart framing allowance on top of the upload ceiling
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub registry: Arc<AdapterRegistry>,
    pub detector: Arc<Detector>,
    pub orchestrator: Arc<ImportOrchestrator>,
    pub exporter: Arc<Exporter>,
    pub limits: RateLimits,
    pub settings: Arc<ImporterSettings>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire the services around an already-populated registry
    pub fn new(db: SqlitePool, registry: Arc<AdapterRegistry>, settings: ImporterSettings) -> Self {
        let detector = Arc::new(Detector::new(
            registry.clone(),
            settings.cache_ttl,
            settings.cache_capacity,
        ));
        let orchestrator = Arc::new(ImportOrchestrator::new(
            db.clone(),
            registry.clone(),
            detector.clone(),
            Validator::with_default_rules(),
        ));
        let exporter = Arc::new(Exporter::new(db.clone(), registry.clone()));

        Self {
            db,
            limits: settings.rate_limits(),
            registry,
            detector,
            orchestrator,
            exporter,
            settings: Arc::new(settings),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.settings.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .merge(api::import_routes(&state))
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
