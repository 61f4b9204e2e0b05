//! Loopback adapter service
//!
//! A real axum server on 127.0.0.1 speaking the adapter contract, so the
//! HTTP client, registry and router are exercised over an actual socket.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Canonical sheet with the given skill names, in wire field names
pub fn sample_sheet(name: &str, skills: &[&str]) -> Value {
    let skills: Vec<Value> = skills
        .iter()
        .map(|skill| json!({"name": skill, "fertigkeitswert": 12, "quelle": "KOD5"}))
        .collect();

    json!({
        "id": "moam-character-17",
        "name": name,
        "rasse": "Mensch",
        "typ": "Krieger",
        "game_system": "midgard",
        "grad": 3,
        "eigenschaften": {"st": 92, "gs": 71, "gw": 65, "ko": 80, "in": 61, "zt": 12, "au": 55, "pa": 48, "wk": 70},
        "lp": {"max": 14, "value": 11},
        "ap": {"max": 25, "value": 20},
        "b": {"max": 24, "value": 24},
        "fertigkeiten": skills,
        "waffen": [{"name": "Langschwert", "anzahl": 1, "gewicht": 1.5}],
        "behaeltnisse": [{"name": "Rucksack", "tragkraft": 25.0, "volumen": 20.0}],
        "spezialisierung": ["Langschwert"],
        "bmrt_version": "1.0",
        "extensions": {"moam": {"raw_id": 17}},
        "_metadata": {"source_format": "moam-vtt", "adapter_id": "moam-vtt-v1"}
    })
}

/// Behaviour of one mock adapter
#[derive(Clone)]
pub struct MockAdapter {
    pub id: String,
    pub extensions: Vec<String>,
    pub capabilities: Vec<String>,
    pub confidence: f64,
    pub sheet: Value,
}

impl MockAdapter {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            extensions: vec![".json".to_string()],
            capabilities: vec!["detect".into(), "import".into(), "export".into()],
            confidence: 0.95,
            sheet: sample_sheet("Bjarne Fischer", &["Klettern", "Reiten"]),
        }
    }

    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_sheet(mut self, sheet: Value) -> Self {
        self.sheet = sheet;
        self
    }

    /// Bind an ephemeral loopback port and serve
    pub async fn spawn(self) -> MockAdapterHandle {
        let shared = Arc::new(Shared {
            adapter: self,
            healthy: AtomicBool::new(true),
            detect_calls: AtomicUsize::new(0),
            exported: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/metadata", get(metadata))
            .route("/detect", post(detect))
            .route("/import", post(import))
            .route("/export", post(export))
            .route("/moved/metadata", get(|| async { Redirect::temporary("/metadata") }))
            .with_state(shared.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockAdapterHandle {
            base_url: format!("http://{}", addr),
            shared,
            task,
        }
    }
}

pub struct Shared {
    adapter: MockAdapter,
    healthy: AtomicBool,
    detect_calls: AtomicUsize,
    exported: Mutex<Vec<Value>>,
}

/// Running mock adapter; the server stops when the handle is dropped
pub struct MockAdapterHandle {
    pub base_url: String,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl MockAdapterHandle {
    pub fn id(&self) -> &str {
        &self.shared.adapter.id
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.shared.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn detect_calls(&self) -> usize {
        self.shared.detect_calls.load(Ordering::SeqCst)
    }

    /// Character bodies received on `POST /export`
    pub fn exported(&self) -> Vec<Value> {
        self.shared.exported.lock().unwrap().clone()
    }
}

impl Drop for MockAdapterHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

type SharedState = State<Arc<Shared>>;

fn unavailable() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "adapter offline").into_response()
}

async fn metadata(State(shared): SharedState) -> Response {
    if !shared.healthy.load(Ordering::SeqCst) {
        return unavailable();
    }
    let adapter = &shared.adapter;
    Json(json!({
        "id": adapter.id,
        "name": format!("{} mock", adapter.id),
        "version": "1.0.0",
        "bmrt_versions": ["1.0"],
        "supported_extensions": adapter.extensions,
        "capabilities": adapter.capabilities,
    }))
    .into_response()
}

async fn detect(State(shared): SharedState, _body: Bytes) -> Response {
    shared.detect_calls.fetch_add(1, Ordering::SeqCst);
    if !shared.healthy.load(Ordering::SeqCst) {
        return unavailable();
    }
    Json(json!({"confidence": shared.adapter.confidence, "version": "5.0"})).into_response()
}

async fn import(State(shared): SharedState, body: Bytes) -> Response {
    if !shared.healthy.load(Ordering::SeqCst) {
        return unavailable();
    }
    if body.is_empty() {
        return (StatusCode::BAD_REQUEST, "empty body").into_response();
    }
    Json(shared.adapter.sheet.clone()).into_response()
}

async fn export(State(shared): SharedState, Json(character): Json<Value>) -> Response {
    if !shared.healthy.load(Ordering::SeqCst) {
        return unavailable();
    }
    let name = character["name"].as_str().unwrap_or_default().to_string();
    shared.exported.lock().unwrap().push(character);
    Json(json!({"format": shared.adapter.id, "name": name})).into_response()
}
