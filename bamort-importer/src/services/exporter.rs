//! Character export through an adapter
//!
//! The adapter is the one named by the caller or, failing that, the adapter
//! the character was last imported with.

use crate::adapters::{AdapterError, AdapterRegistry};
use crate::db::{characters, history};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    /// Missing or owned by someone else; the two are not distinguished
    #[error("Character {0} not found or access denied")]
    CharacterNotFound(i64),

    #[error("No adapter specified and character has no import history")]
    NoAdapter,

    #[error("Adapter '{adapter_id}' not available")]
    AdapterUnavailable { adapter_id: String, available: Vec<String> },

    #[error("Adapter '{0}' is currently unhealthy")]
    AdapterUnhealthy(String),

    #[error("Export failed: {0}")]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Storage(#[from] bamort_common::Error),
}

/// Rendered export ready for download
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedFile {
    pub filename: String,
    pub adapter_id: String,
    pub content: Vec<u8>,
}

pub struct Exporter {
    db: SqlitePool,
    registry: Arc<AdapterRegistry>,
}

impl Exporter {
    pub fn new(db: SqlitePool, registry: Arc<AdapterRegistry>) -> Self {
        Self { db, registry }
    }

    pub async fn export(
        &self,
        user_id: &str,
        character_id: i64,
        adapter_id: Option<&str>,
    ) -> Result<ExportedFile, ExportError> {
        let stored = characters::get_character(&self.db, character_id)
            .await?
            .filter(|stored| stored.owner == user_id)
            .ok_or(ExportError::CharacterNotFound(character_id))?;

        let adapter_id = match adapter_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => history::latest_adapter_for_character(&self.db, character_id)
                .await?
                .ok_or(ExportError::NoAdapter)?,
        };

        let adapter = match self.registry.get(&adapter_id).await {
            Some(adapter) => adapter,
            None => {
                let available = self
                    .registry
                    .get_healthy()
                    .await
                    .into_iter()
                    .map(|a| a.id)
                    .collect();
                return Err(ExportError::AdapterUnavailable { adapter_id, available });
            }
        };
        if !adapter.healthy {
            return Err(ExportError::AdapterUnhealthy(adapter_id));
        }

        let content = self.registry.export(&adapter_id, &stored.character).await?;
        tracing::info!(
            character_id,
            adapter_id = %adapter_id,
            bytes = content.len(),
            "Character exported"
        );

        Ok(ExportedFile {
            filename: export_filename(&stored.character.name, &adapter_id),
            adapter_id,
            content,
        })
    }
}

/// `<name>_<adapter>.json`, restricted to characters safe in a header
pub fn export_filename(name: &str, adapter_id: &str) -> String {
    let clean = |raw: &str| -> String {
        raw.chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
            .collect()
    };

    let name = clean(name.trim());
    let name = if name.trim_matches('_').is_empty() {
        "character".to_string()
    } else {
        name
    };
    format!("{}_{}.json", name, clean(adapter_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fake::{adapter, FakeClient, ALL};
    use crate::db::characters::{insert_character, NewCharacter};
    use crate::models::{CharacterImport, NewImportHistory};
    use bamort_common::db::init_memory_database;
    use chrono::Utc;
    use std::time::Duration;

    async fn setup() -> (SqlitePool, Arc<FakeClient>, Exporter, i64) {
        let pool = init_memory_database().await.unwrap();
        let client = Arc::new(FakeClient::default());
        let registry = Arc::new(AdapterRegistry::new(client.clone(), Duration::from_secs(1), 0.7));
        registry.register(adapter("moam-vtt-v1", "http://moam", ALL)).await.unwrap();
        registry.register(adapter("foundry-v1", "http://foundry", ALL)).await.unwrap();

        let character = CharacterImport {
            name: "Bjarne Fischer".to_string(),
            ..Default::default()
        };
        let mut conn = pool.acquire().await.unwrap();
        let character_id = insert_character(
            &mut conn,
            &NewCharacter {
                owner: "u1",
                character: &character,
                game_system_id: 1,
                adapter_id: "moam-vtt-v1",
                imported_at: Utc::now(),
            },
        )
        .await
        .unwrap();

        let import_id = history::create_in_progress(
            &mut conn,
            &NewImportHistory {
                user_id: "u1".to_string(),
                adapter_id: "moam-vtt-v1".to_string(),
                source_format: "moam-vtt".to_string(),
                source_filename: "bjarne.json".to_string(),
                source_snapshot: Vec::new(),
                mapping_snapshot: None,
                bmrt_version: "1.0".to_string(),
                imported_at: Utc::now(),
            },
        )
        .await
        .unwrap();
        history::mark_success(&mut conn, import_id, character_id).await.unwrap();
        drop(conn);

        (pool.clone(), client, Exporter::new(pool, registry), character_id)
    }

    #[tokio::test]
    async fn test_defaults_to_import_adapter() {
        let (_pool, _client, exporter, id) = setup().await;

        let file = exporter.export("u1", id, None).await.unwrap();

        assert_eq!(file.adapter_id, "moam-vtt-v1");
        assert_eq!(file.filename, "Bjarne_Fischer_moam-vtt-v1.json");
        assert_eq!(file.content, b"exported");
    }

    #[tokio::test]
    async fn test_explicit_adapter_overrides_history() {
        let (_pool, _client, exporter, id) = setup().await;
        let file = exporter.export("u1", id, Some("foundry-v1")).await.unwrap();
        assert_eq!(file.adapter_id, "foundry-v1");
    }

    #[tokio::test]
    async fn test_other_users_character_is_hidden() {
        let (_pool, _client, exporter, id) = setup().await;
        assert!(matches!(
            exporter.export("u2", id, None).await,
            Err(ExportError::CharacterNotFound(_))
        ));
        assert!(matches!(
            exporter.export("u1", id + 100, None).await,
            Err(ExportError::CharacterNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_adapter_lists_healthy_ones() {
        let (_pool, _client, exporter, id) = setup().await;

        match exporter.export("u1", id, Some("gone")).await {
            Err(ExportError::AdapterUnavailable { adapter_id, available }) => {
                assert_eq!(adapter_id, "gone");
                assert_eq!(available, vec!["foundry-v1".to_string(), "moam-vtt-v1".to_string()]);
            }
            other => panic!("expected unavailable adapter, got {:?}", other),
        }
    }

    #[test]
    fn test_filename_is_header_safe() {
        assert_eq!(export_filename("Jörg \"the\" Bold", "moam"), "J_rg__the__Bold_moam.json");
        assert_eq!(export_filename("   ", "moam"), "character_moam.json");
        assert_eq!(export_filename("a/b\\c", "x;y"), "a_b_c_x_y.json");
    }
}
