//! Layered format detection
//!
//! # Decision order
//! 1. Caller-specified adapter (must exist and be healthy)
//! 2. File extension claimed by exactly one healthy detector
//! 3. Signature cache (SHA-256 of the first [`SIGNATURE_PREFIX`] bytes)
//! 4. Registry fan-out; a success is cached under the signature
//!
//! Each step short-circuits the rest. Only step 4 talks to adapters.

use crate::adapters::{AdapterError, AdapterRegistry};
use crate::models::adapter::file_extension;
use crate::models::{Capability, Detection, DetectionMethod};
use axum::body::Bytes;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Bytes of content hashed into a cache signature
pub const SIGNATURE_PREFIX: usize = 1024;

#[derive(Debug, Clone)]
struct CacheEntry {
    adapter_id: String,
    confidence: f64,
    cached_at: Instant,
}

/// Hex SHA-256 of the content prefix
pub fn signature(data: &[u8]) -> String {
    let prefix = &data[..data.len().min(SIGNATURE_PREFIX)];
    format!("{:x}", Sha256::digest(prefix))
}

/// Format detector with its own signature cache
pub struct Detector {
    registry: Arc<AdapterRegistry>,
    cache: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    capacity: usize,
}

impl Detector {
    pub fn new(registry: Arc<AdapterRegistry>, ttl: Duration, capacity: usize) -> Self {
        Self {
            registry,
            cache: RwLock::new(HashMap::new()),
            ttl,
            capacity,
        }
    }

    /// Pick the adapter for `data`
    pub async fn detect(
        &self,
        data: &Bytes,
        filename: &str,
        specified: Option<&str>,
    ) -> Result<Detection, AdapterError> {
        if let Some(adapter_id) = specified.map(str::trim).filter(|id| !id.is_empty()) {
            return self.specified(adapter_id).await;
        }

        if let Some(detection) = self.by_extension(filename).await {
            return Ok(detection);
        }

        let key = signature(data);
        if let Some(detection) = self.cached(&key).await {
            tracing::debug!(adapter_id = %detection.adapter_id, "Detection cache hit");
            return Ok(detection);
        }

        let (adapter_id, confidence) = self.registry.detect(data.clone(), filename).await?;
        self.store(key, &adapter_id, confidence).await;

        Ok(Detection {
            adapter_id,
            confidence,
            method: DetectionMethod::FanOut,
        })
    }

    async fn specified(&self, adapter_id: &str) -> Result<Detection, AdapterError> {
        let adapter = self
            .registry
            .get(adapter_id)
            .await
            .ok_or_else(|| AdapterError::NotFound(adapter_id.to_string()))?;

        if !adapter.healthy {
            return Err(AdapterError::Unhealthy(adapter_id.to_string()));
        }

        Ok(Detection {
            adapter_id: adapter.id,
            confidence: 1.0,
            method: DetectionMethod::Specified,
        })
    }

    async fn by_extension(&self, filename: &str) -> Option<Detection> {
        let extension = file_extension(filename)?;

        let mut matches = self
            .registry
            .get_healthy()
            .await
            .into_iter()
            .filter(|adapter| adapter.supports(Capability::Detect) && adapter.handles_extension(&extension));

        let first = matches.next()?;
        if matches.next().is_some() {
            tracing::debug!(extension = %extension, "Extension claimed by several adapters, falling through");
            return None;
        }

        tracing::debug!(adapter_id = %first.id, extension = %extension, "Detected by extension");
        Some(Detection {
            adapter_id: first.id,
            confidence: 1.0,
            method: DetectionMethod::Extension,
        })
    }

    async fn cached(&self, key: &str) -> Option<Detection> {
        let cache = self.cache.read().await;
        let entry = cache.get(key)?;
        if entry.cached_at.elapsed() >= self.ttl {
            return None;
        }
        Some(Detection {
            adapter_id: entry.adapter_id.clone(),
            confidence: entry.confidence,
            method: DetectionMethod::Cache,
        })
    }

    async fn store(&self, key: String, adapter_id: &str, confidence: f64) {
        if self.capacity == 0 {
            return;
        }

        let mut cache = self.cache.write().await;
        if cache.len() >= self.capacity && !cache.contains_key(&key) {
            let ttl = self.ttl;
            cache.retain(|_, entry| entry.cached_at.elapsed() < ttl);

            if cache.len() >= self.capacity {
                let oldest = cache
                    .iter()
                    .min_by_key(|(_, entry)| entry.cached_at)
                    .map(|(key, _)| key.clone());
                if let Some(oldest) = oldest {
                    cache.remove(&oldest);
                }
            }
        }

        cache.insert(
            key,
            CacheEntry {
                adapter_id: adapter_id.to_string(),
                confidence,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop expired cache entries; returns how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut cache = self.cache.write().await;
        let before = cache.len();
        let ttl = self.ttl;
        cache.retain(|_, entry| entry.cached_at.elapsed() < ttl);
        before - cache.len()
    }

    pub async fn cache_len(&self) -> usize {
        self.cache.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fake::{adapter, FakeClient, ALL};
    use crate::models::AdapterMetadata;

    async fn detector(client: FakeClient, adapters: Vec<AdapterMetadata>, ttl: Duration) -> (Arc<FakeClient>, Detector) {
        let client = Arc::new(client);
        let registry = AdapterRegistry::new(client.clone(), Duration::from_secs(2), 0.7);
        for meta in adapters {
            registry.register(meta).await.unwrap();
        }
        (client, Detector::new(Arc::new(registry), ttl, 16))
    }

    fn with_extensions(mut meta: AdapterMetadata, extensions: &[&str]) -> AdapterMetadata {
        meta.supported_extensions = extensions.iter().map(|s| s.to_string()).collect();
        meta
    }

    #[test]
    fn test_signature_is_deterministic_and_prefix_bound() {
        let a = vec![b'a'; 4096];
        let mut b = a.clone();
        b[2000] = b'b';
        let mut c = a.clone();
        c[10] = b'c';

        assert_eq!(signature(&a), signature(&a.clone()));
        assert_eq!(signature(&a), signature(&b));
        assert_ne!(signature(&a), signature(&c));
        assert_ne!(signature(b"short"), signature(b"shorT"));
        assert_eq!(signature(b"").len(), 64);
    }

    #[tokio::test]
    async fn test_specified_adapter_skips_detection_traffic() {
        let mut sick = adapter("sick", "http://sick", ALL);
        sick.healthy = false;
        let (client, detector) = detector(
            FakeClient::default(),
            vec![adapter("a", "http://a", ALL), sick],
            Duration::from_secs(300),
        )
        .await;
        let data = Bytes::from_static(b"{}");

        let detection = detector.detect(&data, "x.bin", Some("a")).await.unwrap();
        assert_eq!(detection.method, DetectionMethod::Specified);
        assert_eq!(detection.confidence, 1.0);

        assert!(matches!(
            detector.detect(&data, "x.bin", Some("missing")).await,
            Err(AdapterError::NotFound(_))
        ));
        assert!(matches!(
            detector.detect(&data, "x.bin", Some("sick")).await,
            Err(AdapterError::Unhealthy(_))
        ));
        assert_eq!(client.detect_count(), 0);
    }

    #[tokio::test]
    async fn test_unique_extension_short_circuits() {
        let (client, detector) = detector(
            FakeClient::default(),
            vec![
                with_extensions(adapter("moam", "http://moam", ALL), &[".json"]),
                with_extensions(adapter("csv", "http://csv", ALL), &[".csv"]),
            ],
            Duration::from_secs(300),
        )
        .await;

        let detection = detector
            .detect(&Bytes::from_static(b"{}"), "Bjarne.JSON", None)
            .await
            .unwrap();
        assert_eq!(detection.adapter_id, "moam");
        assert_eq!(detection.method, DetectionMethod::Extension);
        assert_eq!(client.detect_count(), 0);
    }

    #[tokio::test]
    async fn test_ambiguous_extension_falls_through_to_fan_out() {
        let client = FakeClient::default()
            .with_confidence("http://moam", 0.9)
            .with_confidence("http://foundry", 0.3);
        let (client, detector) = detector(
            client,
            vec![adapter("moam", "http://moam", ALL), adapter("foundry", "http://foundry", ALL)],
            Duration::from_secs(300),
        )
        .await;

        let detection = detector
            .detect(&Bytes::from_static(b"{\"a\":1}"), "x.json", None)
            .await
            .unwrap();
        assert_eq!(detection.adapter_id, "moam");
        assert_eq!(detection.method, DetectionMethod::FanOut);
        assert_eq!(client.detect_count(), 2);
    }

    #[tokio::test]
    async fn test_cache_hit_avoids_second_fan_out() {
        let client = FakeClient::default().with_confidence("http://moam", 0.85);
        let (client, detector) = detector(
            client,
            vec![with_extensions(adapter("moam", "http://moam", ALL), &[])],
            Duration::from_secs(300),
        )
        .await;
        let data = Bytes::from_static(b"{\"name\":\"Bjarne\"}");

        let first = detector.detect(&data, "upload", None).await.unwrap();
        assert_eq!(first.method, DetectionMethod::FanOut);

        let second = detector.detect(&data, "upload", None).await.unwrap();
        assert_eq!(second.method, DetectionMethod::Cache);
        assert_eq!(second.adapter_id, "moam");
        assert_eq!(second.confidence, 0.85);
        assert_eq!(client.detect_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_entries_expire() {
        let client = FakeClient::default().with_confidence("http://moam", 0.85);
        let (client, detector) = detector(
            client,
            vec![with_extensions(adapter("moam", "http://moam", ALL), &[])],
            Duration::from_millis(30),
        )
        .await;
        let data = Bytes::from_static(b"{\"name\":\"Bjarne\"}");

        detector.detect(&data, "upload", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        let again = detector.detect(&data, "upload", None).await.unwrap();
        assert_eq!(again.method, DetectionMethod::FanOut);
        assert_eq!(client.detect_count(), 2);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(detector.purge_expired().await, 1);
        assert_eq!(detector.cache_len().await, 0);
    }

    #[tokio::test]
    async fn test_below_threshold_is_not_cached() {
        let client = FakeClient::default().with_confidence("http://moam", 0.5);
        let (_, detector) = detector(
            client,
            vec![with_extensions(adapter("moam", "http://moam", ALL), &[])],
            Duration::from_secs(300),
        )
        .await;

        let result = detector.detect(&Bytes::from_static(b"???"), "upload", None).await;
        assert!(matches!(result, Err(AdapterError::BelowThreshold { .. })));
        assert_eq!(detector.cache_len().await, 0);
    }

    #[tokio::test]
    async fn test_cache_is_bounded() {
        let client = FakeClient::default().with_confidence("http://moam", 0.9);
        let client = Arc::new(client);
        let registry = AdapterRegistry::new(client.clone(), Duration::from_secs(2), 0.7);
        registry
            .register(with_extensions(adapter("moam", "http://moam", ALL), &[]))
            .await
            .unwrap();
        let detector = Detector::new(Arc::new(registry), Duration::from_secs(300), 2);

        for i in 0..5u8 {
            detector.detect(&Bytes::from(vec![i; 8]), "upload", None).await.unwrap();
        }
        assert_eq!(detector.cache_len().await, 2);
    }
}
