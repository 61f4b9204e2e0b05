//! In-process adapter transport for unit tests

use super::client::{AdapterClient, AdapterError};
use crate::models::{AdapterMetadata, BmrtCharacter, Capability, CharacterImport, DetectResponse};
use async_trait::async_trait;
use axum::body::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Transport keyed by base URL
#[derive(Default)]
pub struct FakeClient {
    confidences: HashMap<String, f64>,
    imports: HashMap<String, BmrtCharacter>,
    down: Mutex<HashSet<String>>,
    panic_on_import: bool,
    pub detect_calls: AtomicUsize,
    pub health_calls: AtomicUsize,
    pub import_calls: AtomicUsize,
}

impl FakeClient {
    pub fn with_confidence(mut self, base_url: &str, confidence: f64) -> Self {
        self.confidences.insert(base_url.to_string(), confidence);
        self
    }

    pub fn with_import(mut self, base_url: &str, character: BmrtCharacter) -> Self {
        self.imports.insert(base_url.to_string(), character);
        self
    }

    pub fn panicking_import(mut self) -> Self {
        self.panic_on_import = true;
        self
    }

    pub fn set_down(&self, base_url: &str, down: bool) {
        let mut set = self.down.lock().unwrap();
        if down {
            set.insert(base_url.to_string());
        } else {
            set.remove(base_url);
        }
    }

    fn check_up(&self, base_url: &str) -> Result<(), AdapterError> {
        if self.down.lock().unwrap().contains(base_url) {
            return Err(AdapterError::Transport("connection refused".to_string()));
        }
        Ok(())
    }

    pub fn detect_count(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst)
    }
}

/// Healthy adapter at `base_url` declaring `capabilities` and `.json`
pub fn adapter(id: &str, base_url: &str, capabilities: &[Capability]) -> AdapterMetadata {
    AdapterMetadata {
        id: id.to_string(),
        name: id.to_string(),
        version: "1.0".to_string(),
        bmrt_versions: vec!["1.0".to_string()],
        supported_extensions: vec![".json".to_string()],
        base_url: base_url.to_string(),
        capabilities: capabilities.to_vec(),
        healthy: true,
        last_checked_at: None,
        last_error: None,
    }
}

pub const ALL: &[Capability] = &[Capability::Detect, Capability::Import, Capability::Export];

#[async_trait]
impl AdapterClient for FakeClient {
    async fn fetch_metadata(&self, base_url: &str) -> Result<AdapterMetadata, AdapterError> {
        self.check_up(base_url)?;
        let mut meta = adapter("reported", base_url, &[Capability::Detect]);
        meta.healthy = false;
        Ok(meta)
    }

    async fn health_check(&self, base_url: &str) -> Result<(), AdapterError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        if self.down.lock().unwrap().contains(base_url) {
            return Err(AdapterError::Status {
                status: 503,
                body: "down".to_string(),
            });
        }
        Ok(())
    }

    async fn detect(&self, base_url: &str, _data: Bytes, _timeout: Duration) -> Result<DetectResponse, AdapterError> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        self.check_up(base_url)?;
        Ok(DetectResponse {
            confidence: self.confidences.get(base_url).copied().unwrap_or(0.0),
            version: None,
        })
    }

    async fn import(&self, base_url: &str, _data: Bytes) -> Result<BmrtCharacter, AdapterError> {
        self.import_calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_import {
            panic!("adapter client exploded");
        }
        self.check_up(base_url)?;
        Ok(self.imports.get(base_url).cloned().unwrap_or_default())
    }

    async fn export(&self, base_url: &str, _character: &CharacterImport) -> Result<Vec<u8>, AdapterError> {
        self.check_up(base_url)?;
        Ok(b"exported".to_vec())
    }
}
