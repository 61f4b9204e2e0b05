//! Import pipeline
//!
//! detect -> adapter import -> validate -> snapshot -> persist
//!
//! Persistence runs in one transaction. The history row is written first,
//! then reconciliation and character creation run inside a savepoint. When
//! any step in the savepoint fails, only the savepoint is rolled back and the
//! history row is committed as `failed` with the error in its log, so nothing
//! of the character survives while the attempt stays visible.

use crate::adapters::{AdapterError, AdapterRegistry};
use crate::db::characters::{self, NewCharacter};
use crate::db::history;
use crate::models::{BmrtCharacter, ImportResult, ImportStatus, NewImportHistory, ValidationIssue};
use crate::services::detector::Detector;
use crate::services::reconciler::{reconcile_character, ReconcileContext};
use crate::services::validator::{ValidationReport, Validator};
use crate::utils::{begin_monitored, compress, MonitoredTransaction};
use axum::body::Bytes;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use sqlx::{Connection, SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// One uploaded file to import
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub user_id: String,
    pub filename: String,
    pub data: Bytes,
    /// Skip detection and use this adapter
    pub adapter_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("Character validation failed")]
    Validation(ValidationReport),

    #[error("Failed to compress source data: {0}")]
    Compression(String),

    /// Persistence failed after the history row was written
    #[error("Import {import_id} failed: {message}")]
    Failed { import_id: i64, message: String },

    #[error("Import aborted unexpectedly: {message}")]
    Panicked { import_id: Option<i64>, message: String },

    #[error(transparent)]
    Storage(#[from] bamort_common::Error),
}

impl ImportError {
    /// History row recording this failure, if one was written
    pub fn import_id(&self) -> Option<i64> {
        match self {
            ImportError::Failed { import_id, .. } => Some(*import_id),
            ImportError::Panicked { import_id, .. } => *import_id,
            _ => None,
        }
    }
}

struct Persisted {
    character_id: i64,
    warnings: Vec<ValidationIssue>,
    created: BTreeMap<String, usize>,
}

/// Runs imports end to end
pub struct ImportOrchestrator {
    db: SqlitePool,
    registry: Arc<AdapterRegistry>,
    detector: Arc<Detector>,
    validator: Validator,
}

impl ImportOrchestrator {
    pub fn new(
        db: SqlitePool,
        registry: Arc<AdapterRegistry>,
        detector: Arc<Detector>,
        validator: Validator,
    ) -> Self {
        Self {
            db,
            registry,
            detector,
            validator,
        }
    }

    /// Import one file and persist the character
    ///
    /// A panic anywhere in the pipeline rolls back the open transaction and
    /// is reported as [`ImportError::Panicked`] with a `failed` history row.
    pub async fn import(&self, request: ImportRequest) -> Result<ImportResult, ImportError> {
        let started = Instant::now();
        let mut selected = None;
        let outcome = AssertUnwindSafe(self.run(&request, &mut selected)).catch_unwind().await;

        match outcome {
            Ok(Ok(result)) => {
                tracing::info!(
                    import_id = result.import_id,
                    character_id = result.character_id,
                    adapter_id = %result.adapter_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Import completed"
                );
                Ok(result)
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    import_id = ?e.import_id(),
                    user_id = %request.user_id,
                    filename = %request.filename,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "Import failed"
                );
                Err(e)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                let adapter_id = selected.as_deref().unwrap_or("unknown");
                tracing::error!(
                    user_id = %request.user_id,
                    filename = %request.filename,
                    adapter_id,
                    panic = %message,
                    "Import panicked, transaction rolled back"
                );
                let import_id = self
                    .record_failure_outside(None, &request, adapter_id, &format!("Import panicked: {}", message))
                    .await;
                Err(ImportError::Panicked { import_id, message })
            }
        }
    }

    /// Pipeline body; `selected` receives the adapter id once detection resolves it
    async fn run(&self, request: &ImportRequest, selected: &mut Option<String>) -> Result<ImportResult, ImportError> {
        let detection = self
            .detector
            .detect(&request.data, &request.filename, request.adapter_id.as_deref())
            .await?;
        let adapter_id = detection.adapter_id;
        *selected = Some(adapter_id.clone());
        tracing::debug!(
            adapter_id = %adapter_id,
            confidence = detection.confidence,
            method = ?detection.method,
            "Adapter selected"
        );

        let bmrt = self.registry.import(&adapter_id, request.data.clone()).await?;

        let report = self.validator.validate(&bmrt);
        if !report.is_valid() {
            return Err(ImportError::Validation(report));
        }

        let snapshot = compress(&request.data).map_err(|e| ImportError::Compression(e.to_string()))?;
        let new_history = history_row(request, &adapter_id, &bmrt, snapshot);

        let mut tx = begin_monitored(&self.db, "orchestrator::import").await?;
        let import_id = history::create_in_progress(tx.conn()?, &new_history).await?;
        tracing::debug!(import_id, adapter_id = %adapter_id, "Import history created");

        // From here on every failure leaves a `failed` row behind
        let staged = stage_character(&mut tx, import_id, &request.user_id, &adapter_id, &bmrt, new_history.imported_at).await;
        let (message, log) = match staged {
            Staged::Written(persisted) => match commit_success(tx, import_id, persisted.character_id).await {
                Ok(()) => {
                    let mut warnings = report.warnings;
                    warnings.extend(persisted.warnings);
                    return Ok(ImportResult {
                        character_id: persisted.character_id,
                        import_id,
                        adapter_id,
                        warnings,
                        created_items: persisted.created,
                        status: ImportStatus::Success,
                    });
                }
                Err(e) => {
                    let message = format!("Failed to finalize import: {}", e);
                    (message.clone(), message)
                }
            },
            Staged::RolledBack(message) => match commit_failure(tx, import_id, &message).await {
                Ok(()) => return Err(ImportError::Failed { import_id, message }),
                Err(e) => {
                    let log = format!("{}; failure record could not be committed: {}", message, e);
                    (message, log)
                }
            },
            Staged::Broken(message) => {
                // release the connection before recording the failure
                drop(tx);
                (message.clone(), message)
            }
        };

        let import_id = self
            .record_failure_outside(Some(import_id), request, &adapter_id, &log)
            .await
            .unwrap_or(import_id);
        Err(ImportError::Failed { import_id, message })
    }

    /// Best-effort `failed` record once the main transaction is gone
    ///
    /// Marks the existing row when it was committed, otherwise writes a new
    /// one. Returns the id of the row that now holds the failure.
    async fn record_failure_outside(
        &self,
        import_id: Option<i64>,
        request: &ImportRequest,
        adapter_id: &str,
        log: &str,
    ) -> Option<i64> {
        let result: bamort_common::Result<i64> = async {
            let mut conn = self.db.acquire().await?;
            if let Some(id) = import_id {
                if history::mark_failed(&mut conn, id, log).await? {
                    return Ok(id);
                }
            }
            let row = NewImportHistory {
                user_id: request.user_id.clone(),
                adapter_id: adapter_id.to_string(),
                source_format: adapter_id.to_string(),
                source_filename: request.filename.clone(),
                source_snapshot: Vec::new(),
                mapping_snapshot: None,
                bmrt_version: String::new(),
                imported_at: Utc::now(),
            };
            let id = history::create_in_progress(&mut conn, &row).await?;
            history::mark_failed(&mut conn, id, log).await?;
            Ok(id)
        }
        .await;

        match result {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!(import_id = ?import_id, error = %e, "Failed to record import failure");
                None
            }
        }
    }
}

fn history_row(request: &ImportRequest, adapter_id: &str, bmrt: &BmrtCharacter, snapshot: Vec<u8>) -> NewImportHistory {
    let source_format = Some(bmrt.metadata.source_format.trim())
        .filter(|format| !format.is_empty())
        .unwrap_or(adapter_id)
        .to_string();
    let mapping_snapshot = if bmrt.extensions.is_empty() {
        None
    } else {
        serde_json::to_string(&bmrt.extensions).ok()
    };

    NewImportHistory {
        user_id: request.user_id.clone(),
        adapter_id: adapter_id.to_string(),
        source_format,
        source_filename: request.filename.clone(),
        source_snapshot: snapshot,
        mapping_snapshot,
        bmrt_version: bmrt.bmrt_version.clone(),
        imported_at: Utc::now(),
    }
}

/// Outcome of the character savepoint
enum Staged {
    Written(Persisted),
    /// Savepoint rolled back cleanly, the transaction can still commit
    RolledBack(String),
    /// Savepoint state unknown, the transaction must not commit
    Broken(String),
}

/// Run [`persist`] inside a savepoint of `tx`
async fn stage_character(
    tx: &mut MonitoredTransaction<'_>,
    import_id: i64,
    owner: &str,
    adapter_id: &str,
    bmrt: &BmrtCharacter,
    imported_at: DateTime<Utc>,
) -> Staged {
    let conn = match tx.conn() {
        Ok(conn) => conn,
        Err(e) => return Staged::Broken(e.to_string()),
    };
    let mut savepoint = match conn.begin().await {
        Ok(savepoint) => savepoint,
        Err(e) => return Staged::Broken(format!("Failed to open savepoint: {}", e)),
    };

    match persist(&mut savepoint, import_id, owner, adapter_id, bmrt, imported_at).await {
        Ok(persisted) => match savepoint.commit().await {
            Ok(()) => Staged::Written(persisted),
            Err(e) => Staged::Broken(format!("Failed to release savepoint: {}", e)),
        },
        Err(message) => match savepoint.rollback().await {
            Ok(()) => Staged::RolledBack(message),
            Err(e) => Staged::Broken(format!("{}; savepoint rollback failed: {}", message, e)),
        },
    }
}

/// Mark the row successful and commit; the transaction is gone either way
async fn commit_success(mut tx: MonitoredTransaction<'_>, import_id: i64, character_id: i64) -> bamort_common::Result<()> {
    history::mark_success(tx.conn()?, import_id, character_id).await?;
    tx.commit().await
}

/// Mark the row failed and commit; the transaction is gone either way
async fn commit_failure(mut tx: MonitoredTransaction<'_>, import_id: i64, message: &str) -> bamort_common::Result<()> {
    history::mark_failed(tx.conn()?, import_id, message).await?;
    tx.commit().await
}

/// Reconcile and write the character; errors become the history log text
async fn persist(
    conn: &mut SqliteConnection,
    import_id: i64,
    owner: &str,
    adapter_id: &str,
    bmrt: &BmrtCharacter,
    imported_at: DateTime<Utc>,
) -> Result<Persisted, String> {
    let character = &bmrt.character;

    let mut ctx = ReconcileContext::for_character(conn, import_id, character)
        .await
        .map_err(|e| format!("Failed to resolve game system: {}", e))?;

    let refs = reconcile_character(conn, character, &mut ctx)
        .await
        .map_err(|e| e.to_string())?;

    let new_character = NewCharacter {
        owner,
        character,
        game_system_id: ctx.game_system.id,
        adapter_id,
        imported_at,
    };
    let character_id = characters::insert_character(conn, &new_character)
        .await
        .map_err(|e| format!("Failed to create character: {}", e))?;

    characters::insert_possessions(conn, character_id, character, &refs)
        .await
        .map_err(|e| format!("Failed to create character possessions: {}", e))?;

    Ok(Persisted {
        character_id,
        warnings: ctx.warnings,
        created: ctx.created,
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fake::{adapter, FakeClient, ALL};
    use crate::models::character::Skill;
    use crate::models::CharacterImport;
    use crate::utils::decompress;
    use bamort_common::db::init_memory_database;
    use std::time::Duration;

    fn sheet(skills: &[&str]) -> BmrtCharacter {
        let character = CharacterImport {
            name: "Bjarne Fischer".to_string(),
            class: "Krieger".to_string(),
            game_system: Some("midgard".to_string()),
            skills: skills
                .iter()
                .map(|name| Skill {
                    name: name.to_string(),
                    value: 12,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        BmrtCharacter::new(character, "moam-vtt-v1", "moam-vtt")
    }

    async fn setup(client: FakeClient) -> (SqlitePool, ImportOrchestrator) {
        let pool = init_memory_database().await.unwrap();
        let registry = Arc::new(AdapterRegistry::new(Arc::new(client), Duration::from_secs(1), 0.7));
        registry
            .register(adapter("moam-vtt-v1", "http://moam", ALL))
            .await
            .unwrap();
        let detector = Arc::new(Detector::new(registry.clone(), Duration::from_secs(60), 16));
        let orchestrator = ImportOrchestrator::new(pool.clone(), registry, detector, Validator::default());
        (pool, orchestrator)
    }

    fn request(data: &str) -> ImportRequest {
        ImportRequest {
            user_id: "u1".to_string(),
            filename: "bjarne.json".to_string(),
            data: Bytes::from(data.to_string()),
            adapter_id: None,
        }
    }

    async fn count(pool: &SqlitePool, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
    }

    #[tokio::test]
    async fn test_successful_import_persists_everything() {
        let client = FakeClient::default().with_import("http://moam", sheet(&["Klettern", "Reiten"]));
        let (pool, orchestrator) = setup(client).await;

        let result = orchestrator.import(request(r#"{"name":"Bjarne"}"#)).await.unwrap();

        assert_eq!(result.status, ImportStatus::Success);
        assert_eq!(result.adapter_id, "moam-vtt-v1");
        assert_eq!(result.created_items.get("skills"), Some(&2));

        let stored = history::get_history(&pool, result.import_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ImportStatus::Success);
        assert_eq!(stored.character_id, Some(result.character_id));
        assert_eq!(stored.source_format, "moam-vtt");
        assert_eq!(stored.bmrt_version, "1.0");
        let raw = decompress(&stored.source_snapshot.unwrap()).unwrap();
        assert_eq!(raw, br#"{"name":"Bjarne"}"#);

        assert_eq!(count(&pool, "SELECT COUNT(*) FROM char_skills").await, 2);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM master_data_imports").await, 2);
    }

    #[tokio::test]
    async fn test_second_import_matches_created_items() {
        let client = FakeClient::default().with_import("http://moam", sheet(&["Klettern"]));
        let (pool, orchestrator) = setup(client).await;

        orchestrator.import(request("{}")).await.unwrap();
        let second = orchestrator.import(request("{}")).await.unwrap();

        assert!(second.created_items.is_empty());
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM skills WHERE name = 'Klettern'").await, 1);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM characters").await, 2);
    }

    #[tokio::test]
    async fn test_validation_failure_writes_nothing() {
        let mut nameless = sheet(&[]);
        nameless.character.name = String::new();
        let client = FakeClient::default().with_import("http://moam", nameless);
        let (pool, orchestrator) = setup(client).await;

        let err = orchestrator.import(request("{}")).await.unwrap_err();

        match err {
            ImportError::Validation(report) => assert_eq!(report.errors[0].field, "name"),
            other => panic!("expected validation failure, got {:?}", other),
        }
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM import_histories").await, 0);
    }

    #[tokio::test]
    async fn test_failure_mid_reconciliation_rolls_back_character() {
        let client = FakeClient::default().with_import("http://moam", sheet(&["S1", "S2", "S3", "S4", "S5"]));
        let (pool, orchestrator) = setup(client).await;
        sqlx::query(
            "CREATE TRIGGER reject_s3 BEFORE INSERT ON skills WHEN NEW.name = 'S3' \
             BEGIN SELECT RAISE(ABORT, 'rejected by test trigger'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let err = orchestrator.import(request("{}")).await.unwrap_err();
        let import_id = err.import_id().unwrap();

        assert_eq!(count(&pool, "SELECT COUNT(*) FROM characters").await, 0);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM skills").await, 0);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM master_data_imports").await, 0);

        let stored = history::get_history(&pool, import_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ImportStatus::Failed);
        assert!(stored.error_log.contains("S3"), "log was: {}", stored.error_log);
        assert!(stored.character_id.is_none());
    }

    #[tokio::test]
    async fn test_unknown_specified_adapter() {
        let (pool, orchestrator) = setup(FakeClient::default()).await;
        let mut req = request("{}");
        req.adapter_id = Some("nope".to_string());

        let err = orchestrator.import(req).await.unwrap_err();

        assert!(matches!(err, ImportError::Adapter(AdapterError::NotFound(_))));
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM import_histories").await, 0);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let client = FakeClient::default().panicking_import();
        let (pool, orchestrator) = setup(client).await;

        let err = orchestrator.import(request("{}")).await.unwrap_err();

        let import_id = match err {
            ImportError::Panicked { import_id, .. } => import_id.unwrap(),
            other => panic!("expected panic error, got {:?}", other),
        };
        let stored = history::get_history(&pool, import_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ImportStatus::Failed);
        assert!(stored.error_log.contains("panicked"));
        // detection had already picked the adapter before the panic
        assert_eq!(stored.adapter_id, "moam-vtt-v1");
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM characters").await, 0);
    }

    #[tokio::test]
    async fn test_uncommittable_failure_is_still_recorded() {
        let client = FakeClient::default().with_import("http://moam", sheet(&["S1", "S2", "S3"]));
        let (pool, orchestrator) = setup(client).await;
        for trigger in [
            "CREATE TRIGGER reject_s3 BEFORE INSERT ON skills WHEN NEW.name = 'S3' \
             BEGIN SELECT RAISE(ABORT, 'rejected by test trigger'); END",
            // only the in-transaction failure record is refused
            "CREATE TRIGGER refuse_failed BEFORE UPDATE ON import_histories \
             WHEN NEW.status = 'failed' AND NEW.error_log NOT LIKE '%could not be committed%' \
             BEGIN SELECT RAISE(ABORT, 'history locked'); END",
        ] {
            sqlx::query(trigger).execute(&pool).await.unwrap();
        }

        let err = orchestrator.import(request("{}")).await.unwrap_err();

        let import_id = match &err {
            ImportError::Failed { import_id, message } => {
                assert!(message.contains("S3"), "message was: {}", message);
                *import_id
            }
            other => panic!("expected recorded failure, got {:?}", other),
        };
        let stored = history::get_history(&pool, import_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ImportStatus::Failed);
        assert_eq!(stored.adapter_id, "moam-vtt-v1");
        assert!(stored.error_log.contains("history locked"), "log was: {}", stored.error_log);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM import_histories").await, 1);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM characters").await, 0);
    }

    #[tokio::test]
    async fn test_unfinalized_success_is_recorded_as_failure() {
        let client = FakeClient::default().with_import("http://moam", sheet(&["Klettern"]));
        let (pool, orchestrator) = setup(client).await;
        sqlx::query(
            "CREATE TRIGGER refuse_success BEFORE UPDATE ON import_histories WHEN NEW.status = 'success' \
             BEGIN SELECT RAISE(ABORT, 'history locked'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let err = orchestrator.import(request("{}")).await.unwrap_err();

        let import_id = err.import_id().unwrap();
        assert!(matches!(err, ImportError::Failed { .. }));
        let stored = history::get_history(&pool, import_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ImportStatus::Failed);
        assert!(stored.error_log.contains("Failed to finalize import"));
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM characters").await, 0);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM char_skills").await, 0);
    }
}
