//! HTTP API handlers for bamort-importer
//!
//! Every `/api/import` route requires the `X-User-Id` header. Detect, import
//! and export are additionally rate limited per user, each with its own
//! limiter.

pub mod adapters;
pub mod detect;
pub mod export;
pub mod extract;
pub mod health;
pub mod history;
pub mod import;

pub use health::health_routes;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::AppState;
use extract::rate_limited;

/// Build the `/api/import` routes
pub fn import_routes(state: &AppState) -> Router<AppState> {
    let limits = &state.limits;

    let detect = Router::new()
        .route("/api/import/detect", post(detect::detect))
        .route_layer(middleware::from_fn_with_state(limits.detect.clone(), rate_limited));

    let import = Router::new()
        .route("/api/import/import", post(import::import))
        .route_layer(middleware::from_fn_with_state(limits.import.clone(), rate_limited));

    let export = Router::new()
        .route("/api/import/export/:id", post(export::export_character))
        .route_layer(middleware::from_fn_with_state(limits.export.clone(), rate_limited));

    Router::new()
        .merge(detect)
        .merge(import)
        .merge(export)
        .route("/api/import/adapters", get(adapters::list_adapters))
        .route("/api/import/history", get(history::list_history))
        .route("/api/import/history/:id", get(history::get_history))
}
