//! Adapter registry
//!
//! In-memory directory of adapter services. Reads take the shared lock,
//! registration and health updates take the exclusive lock. Network calls
//! are never made while a lock is held.
//!
//! # Health monitoring
//! [`AdapterRegistry::start_health_checker`] spawns one background task that
//! probes every adapter on a fixed interval until its handle is stopped.

use super::client::{AdapterClient, AdapterError};
use crate::models::{AdapterMetadata, BmrtCharacter, Capability, CharacterImport};
use crate::security::HostGuard;
use axum::body::Bytes;
use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Directory of adapter services
pub struct AdapterRegistry {
    /// Keyed by adapter id; ordered so fan-out ties resolve deterministically
    adapters: RwLock<BTreeMap<String, AdapterMetadata>>,
    client: Arc<dyn AdapterClient>,
    host_guard: Option<HostGuard>,
    probe_timeout: Duration,
    threshold: f64,
}

impl AdapterRegistry {
    pub fn new(client: Arc<dyn AdapterClient>, probe_timeout: Duration, threshold: f64) -> Self {
        Self {
            adapters: RwLock::new(BTreeMap::new()),
            client,
            host_guard: None,
            probe_timeout,
            threshold,
        }
    }

    /// Require every registered base URL to pass `guard`
    pub fn with_host_guard(mut self, guard: HostGuard) -> Self {
        self.host_guard = Some(guard);
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Insert or replace the adapter with `metadata.id`
    pub async fn register(&self, metadata: AdapterMetadata) -> Result<(), AdapterError> {
        if metadata.id.trim().is_empty() {
            return Err(AdapterError::MissingField("ID"));
        }
        if metadata.base_url.trim().is_empty() {
            return Err(AdapterError::MissingField("base URL"));
        }
        if let Some(guard) = &self.host_guard {
            guard.check(&metadata.base_url).await?;
        }

        tracing::info!(
            adapter_id = %metadata.id,
            base_url = %metadata.base_url,
            healthy = metadata.healthy,
            "Adapter registered"
        );

        self.adapters
            .write()
            .await
            .insert(metadata.id.clone(), metadata);
        Ok(())
    }

    /// Query `base_url` for its self-description and register it under `id`
    ///
    /// An adapter that cannot be reached is still registered, unhealthy, so
    /// the health checker can pick it up once it comes online.
    pub async fn register_from_endpoint(&self, id: &str, base_url: &str) -> Result<(), AdapterError> {
        if let Some(guard) = &self.host_guard {
            guard.check(base_url).await?;
        }

        let metadata = match self.client.fetch_metadata(base_url).await {
            Ok(mut metadata) => {
                if metadata.id != id {
                    tracing::warn!(
                        configured = %id,
                        reported = %metadata.id,
                        "Adapter reports a different id, using configured id"
                    );
                }
                metadata.id = id.to_string();
                metadata.base_url = base_url.to_string();
                metadata.healthy = true;
                metadata.last_checked_at = Some(Utc::now());
                metadata.last_error = None;
                metadata
            }
            Err(e) => {
                tracing::warn!(adapter_id = %id, error = %e, "Adapter discovery failed, registering as unhealthy");
                AdapterMetadata {
                    id: id.to_string(),
                    name: id.to_string(),
                    version: String::new(),
                    bmrt_versions: Vec::new(),
                    supported_extensions: Vec::new(),
                    base_url: base_url.to_string(),
                    capabilities: Vec::new(),
                    healthy: false,
                    last_checked_at: Some(Utc::now()),
                    last_error: Some(e.to_string()),
                }
            }
        };

        self.register(metadata).await
    }

    pub async fn get(&self, id: &str) -> Option<AdapterMetadata> {
        self.adapters.read().await.get(id).cloned()
    }

    pub async fn get_all(&self) -> Vec<AdapterMetadata> {
        self.adapters.read().await.values().cloned().collect()
    }

    pub async fn get_healthy(&self) -> Vec<AdapterMetadata> {
        self.adapters
            .read()
            .await
            .values()
            .filter(|adapter| adapter.healthy)
            .cloned()
            .collect()
    }

    /// Probe every adapter once and record the outcome
    pub async fn health_check(&self) {
        // Adapters that were never discovered have no self-description yet
        let snapshot: Vec<(String, String, bool)> = self
            .adapters
            .read()
            .await
            .values()
            .map(|adapter| (adapter.id.clone(), adapter.base_url.clone(), adapter.capabilities.is_empty()))
            .collect();

        let probes = snapshot.iter().map(|(_, base_url, undiscovered)| async move {
            if *undiscovered {
                self.client.fetch_metadata(base_url).await.map(Some)
            } else {
                self.client.health_check(base_url).await.map(|_| None)
            }
        });
        let results = join_all(probes).await;
        let checked_at = Utc::now();

        let mut adapters = self.adapters.write().await;
        for ((id, base_url, _), result) in snapshot.into_iter().zip(results) {
            // Skip adapters replaced while the probe was in flight
            let Some(adapter) = adapters.get_mut(&id).filter(|a| a.base_url == base_url) else {
                continue;
            };

            adapter.last_checked_at = Some(checked_at);
            match result {
                Ok(discovered) => {
                    if let Some(metadata) = discovered {
                        adapter.name = metadata.name;
                        adapter.version = metadata.version;
                        adapter.bmrt_versions = metadata.bmrt_versions;
                        adapter.supported_extensions = metadata.supported_extensions;
                        adapter.capabilities = metadata.capabilities;
                    }
                    if !adapter.healthy {
                        tracing::info!(adapter_id = %id, "Adapter recovered");
                    }
                    adapter.healthy = true;
                    adapter.last_error = None;
                }
                Err(e) => {
                    if adapter.healthy {
                        tracing::warn!(adapter_id = %id, error = %e, "Adapter health check failed");
                    }
                    adapter.healthy = false;
                    adapter.last_error = Some(e.to_string());
                }
            }
        }
    }

    /// Spawn the periodic health checker; the first probe runs after one `period`
    pub fn start_health_checker(self: &Arc<Self>, period: Duration) -> HealthCheckerHandle {
        let token = CancellationToken::new();
        let registry = Arc::clone(self);
        let cancelled = token.clone();

        let join = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => registry.health_check().await,
                }
            }

            tracing::debug!("Adapter health checker stopped");
        });

        tracing::info!(interval_secs = period.as_secs(), "Adapter health checker started");
        HealthCheckerHandle {
            token,
            join: Some(join),
        }
    }

    /// Parse `data` with adapter `adapter_id`
    pub async fn import(&self, adapter_id: &str, data: Bytes) -> Result<BmrtCharacter, AdapterError> {
        let adapter = self.usable(adapter_id, Capability::Import).await?;
        let result = self.client.import(&adapter.base_url, data).await;
        self.note_failure(adapter_id, &result).await;
        result
    }

    /// Render `character` in adapter `adapter_id`'s format
    pub async fn export(&self, adapter_id: &str, character: &CharacterImport) -> Result<Vec<u8>, AdapterError> {
        let adapter = self.usable(adapter_id, Capability::Export).await?;
        let result = self.client.export(&adapter.base_url, character).await;
        self.note_failure(adapter_id, &result).await;
        result
    }

    /// Ask every healthy detector and return the most confident one
    ///
    /// Probes run concurrently, each bounded by the probe timeout. Failed
    /// probes are skipped. On equal confidence the adapter with the smaller
    /// id wins.
    pub async fn detect(&self, data: Bytes, filename: &str) -> Result<(String, f64), AdapterError> {
        let candidates: Vec<AdapterMetadata> = self
            .get_healthy()
            .await
            .into_iter()
            .filter(|adapter| adapter.supports(Capability::Detect))
            .collect();

        if candidates.is_empty() {
            return Err(AdapterError::NoneAvailable);
        }

        let probes = candidates.iter().map(|adapter| {
            let data = data.clone();
            async move {
                match tokio::time::timeout(
                    self.probe_timeout,
                    self.client.detect(&adapter.base_url, data, self.probe_timeout),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(AdapterError::Transport("detect probe timed out".to_string())),
                }
            }
        });
        let results = join_all(probes).await;

        let mut best: Option<(&str, f64)> = None;
        for (adapter, result) in candidates.iter().zip(results) {
            match result {
                Ok(response) if response.confidence.is_finite() => {
                    tracing::debug!(
                        adapter_id = %adapter.id,
                        confidence = response.confidence,
                        "Detect probe answered"
                    );
                    if best.map_or(true, |(_, c)| response.confidence > c) {
                        best = Some((adapter.id.as_str(), response.confidence));
                    }
                }
                Ok(_) => {
                    tracing::debug!(adapter_id = %adapter.id, "Detect probe returned non-finite confidence");
                }
                Err(e) => {
                    tracing::debug!(adapter_id = %adapter.id, error = %e, "Detect probe failed");
                }
            }
        }

        match best {
            Some((id, confidence)) if confidence >= self.threshold => {
                tracing::info!(adapter_id = %id, confidence, filename, "Format detected");
                Ok((id.to_string(), confidence))
            }
            other => Err(AdapterError::BelowThreshold {
                best: other.map_or(0.0, |(_, c)| c),
                threshold: self.threshold,
            }),
        }
    }

    async fn usable(&self, adapter_id: &str, capability: Capability) -> Result<AdapterMetadata, AdapterError> {
        let adapter = self
            .get(adapter_id)
            .await
            .ok_or_else(|| AdapterError::NotFound(adapter_id.to_string()))?;

        if !adapter.healthy {
            return Err(AdapterError::Unhealthy(adapter_id.to_string()));
        }
        if !adapter.supports(capability) {
            return Err(AdapterError::MissingCapability {
                adapter_id: adapter_id.to_string(),
                capability,
            });
        }
        Ok(adapter)
    }

    async fn note_failure<T>(&self, adapter_id: &str, result: &Result<T, AdapterError>) {
        let Err(e) = result else {
            return;
        };
        if !e.marks_unhealthy() {
            return;
        }

        tracing::warn!(adapter_id = %adapter_id, error = %e, "Adapter call failed, marking unhealthy");
        if let Some(adapter) = self.adapters.write().await.get_mut(adapter_id) {
            adapter.healthy = false;
            adapter.last_error = Some(e.to_string());
            adapter.last_checked_at = Some(Utc::now());
        }
    }
}

/// Stops the background health checker
pub struct HealthCheckerHandle {
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl HealthCheckerHandle {
    /// Signal the checker to stop; no tick fires after this returns. Idempotent.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Stop and wait for the task to finish
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                tracing::warn!(error = %e, "Health checker task ended abnormally");
            }
        }
    }
}

impl Drop for HealthCheckerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
