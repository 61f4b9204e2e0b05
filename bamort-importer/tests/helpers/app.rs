//! Router-level test harness

use super::db_utils::create_test_db;
use super::mock_adapter::MockAdapterHandle;
use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use bamort_common::config::TomlConfig;
use bamort_importer::adapters::{AdapterRegistry, HttpAdapterClient};
use bamort_importer::config::ImporterSettings;
use bamort_importer::{build_router, AppState};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "bamort-test-boundary";

pub struct TestApp {
    _dir: TempDir,
    pub pool: SqlitePool,
    pub state: AppState,
    pub router: Router,
}

/// App over a fresh database with `adapters` discovered from their endpoints
pub async fn build_test_app(adapters: &[&MockAdapterHandle], configure: impl FnOnce(&mut TomlConfig)) -> TestApp {
    let (dir, pool) = create_test_db().await.unwrap();

    let mut config = TomlConfig::default();
    configure(&mut config);
    let settings = ImporterSettings::from_toml(&config).unwrap();

    let client = HttpAdapterClient::new(Duration::from_secs(5)).unwrap();
    let registry = Arc::new(AdapterRegistry::new(
        Arc::new(client),
        settings.probe_timeout,
        settings.confidence_threshold,
    ));
    for adapter in adapters {
        registry
            .register_from_endpoint(adapter.id(), &adapter.base_url)
            .await
            .unwrap();
    }

    let state = AppState::new(pool.clone(), registry, settings);
    let router = build_router(state.clone());

    TestApp {
        _dir: dir,
        pool,
        state,
        router,
    }
}

pub async fn call(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// `multipart/form-data` POST carrying `file` and an optional `adapter_id` field
pub fn multipart_request(
    uri: &str,
    user_id: Option<&str>,
    filename: &str,
    content: &[u8],
    adapter_id: Option<&str>,
) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(adapter_id) = adapter_id {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"adapter_id\"\r\n\r\n{adapter_id}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"));
    if let Some(user_id) = user_id {
        builder = builder.header("x-user-id", user_id);
    }
    builder.body(Body::from(body)).unwrap()
}
