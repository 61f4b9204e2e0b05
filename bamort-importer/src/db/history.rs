//! Import ledger persistence
//!
//! `import_histories` rows are created `in_progress` and moved to a terminal
//! status exactly once; the `WHERE status = 'in_progress'` guard on both
//! transitions enforces that.

use crate::models::{ImportHistory, ImportStatus, MasterDataImport, MatchType, NewImportHistory};
use bamort_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

fn parse_timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let value: String = row.get(column);
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

fn history_from_row(row: &SqliteRow, with_snapshot: bool) -> Result<ImportHistory> {
    let status: String = row.get("status");
    let status = status.parse::<ImportStatus>().map_err(Error::Internal)?;

    Ok(ImportHistory {
        id: row.get("id"),
        user_id: row.get("user_id"),
        character_id: row.get("character_id"),
        adapter_id: row.get("adapter_id"),
        source_format: row.get("source_format"),
        source_filename: row.get("source_filename"),
        source_snapshot: if with_snapshot { row.get("source_snapshot") } else { None },
        bmrt_version: row.get("bmrt_version"),
        imported_at: parse_timestamp(row, "imported_at")?,
        status,
        error_log: row.get("error_log"),
        updated_at: parse_timestamp(row, "updated_at")?,
    })
}

const HISTORY_COLUMNS: &str = "id, user_id, character_id, adapter_id, source_format, source_filename, \
     bmrt_version, imported_at, status, error_log, updated_at";

/// Insert a fresh `in_progress` row and return its id
pub async fn create_in_progress(conn: &mut SqliteConnection, new: &NewImportHistory) -> Result<i64> {
    let now = Utc::now().to_rfc3339();

    let result = sqlx::query(
        r#"
        INSERT INTO import_histories (
            user_id, adapter_id, source_format, source_filename, source_snapshot,
            mapping_snapshot, bmrt_version, imported_at, status, error_log, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'in_progress', '', ?, ?)
        "#,
    )
    .bind(&new.user_id)
    .bind(&new.adapter_id)
    .bind(&new.source_format)
    .bind(&new.source_filename)
    .bind(&new.source_snapshot)
    .bind(&new.mapping_snapshot)
    .bind(&new.bmrt_version)
    .bind(new.imported_at.to_rfc3339())
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Move an `in_progress` row to `success`, linking the character
pub async fn mark_success(conn: &mut SqliteConnection, id: i64, character_id: i64) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE import_histories
        SET status = 'success', character_id = ?, updated_at = ?
        WHERE id = ? AND status = 'in_progress'
        "#,
    )
    .bind(character_id)
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("in-progress import {}", id)));
    }
    Ok(())
}

/// Move an `in_progress` row to `failed` with `error_log`
///
/// Returns false when the row was already terminal.
pub async fn mark_failed(conn: &mut SqliteConnection, id: i64, error_log: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE import_histories
        SET status = 'failed', error_log = ?, updated_at = ?
        WHERE id = ? AND status = 'in_progress'
        "#,
    )
    .bind(error_log)
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Append a provenance row
pub async fn insert_master_data_import(
    conn: &mut SqliteConnection,
    import_history_id: i64,
    item_type: &str,
    item_id: i64,
    external_name: &str,
    match_type: MatchType,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO master_data_imports (import_history_id, item_type, item_id, external_name, match_type, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(import_history_id)
    .bind(item_type)
    .bind(item_id)
    .bind(external_name)
    .bind(match_type.as_str())
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Row by id, including the compressed snapshot
pub async fn get_history(pool: &SqlitePool, id: i64) -> Result<Option<ImportHistory>> {
    let sql = format!("SELECT {}, source_snapshot FROM import_histories WHERE id = ?", HISTORY_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;

    row.map(|row| history_from_row(&row, true)).transpose()
}

/// Row by id, only when owned by `user_id`
pub async fn get_for_user(pool: &SqlitePool, id: i64, user_id: &str) -> Result<Option<ImportHistory>> {
    let sql = format!(
        "SELECT {} FROM import_histories WHERE id = ? AND user_id = ?",
        HISTORY_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    row.map(|row| history_from_row(&row, false)).transpose()
}

/// One page of a user's imports, newest first, plus the total count
pub async fn list_for_user(
    pool: &SqlitePool,
    user_id: &str,
    page: u32,
    per_page: u32,
) -> Result<(Vec<ImportHistory>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM import_histories WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    let offset = i64::from(page.saturating_sub(1)) * i64::from(per_page);
    let sql = format!(
        "SELECT {} FROM import_histories WHERE user_id = ? ORDER BY imported_at DESC, id DESC LIMIT ? OFFSET ?",
        HISTORY_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(i64::from(per_page))
        .bind(offset)
        .fetch_all(pool)
        .await?;

    let histories = rows
        .iter()
        .map(|row| history_from_row(row, false))
        .collect::<Result<Vec<_>>>()?;

    Ok((histories, total))
}

/// Provenance rows of one import in insertion order
pub async fn master_data_for(pool: &SqlitePool, import_history_id: i64) -> Result<Vec<MasterDataImport>> {
    let rows = sqlx::query(
        r#"
        SELECT id, import_history_id, item_type, item_id, external_name, match_type, created_at
        FROM master_data_imports
        WHERE import_history_id = ?
        ORDER BY id
        "#,
    )
    .bind(import_history_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let match_type: String = row.get("match_type");
            Ok(MasterDataImport {
                id: row.get("id"),
                import_history_id: row.get("import_history_id"),
                item_type: row.get("item_type"),
                item_id: row.get("item_id"),
                external_name: row.get("external_name"),
                match_type: match_type.parse().map_err(Error::Internal)?,
                created_at: parse_timestamp(row, "created_at")?,
            })
        })
        .collect()
}

/// Adapter of the newest successful import that produced `character_id`
pub async fn latest_adapter_for_character(pool: &SqlitePool, character_id: i64) -> Result<Option<String>> {
    let adapter_id: Option<String> = sqlx::query_scalar(
        r#"
        SELECT adapter_id FROM import_histories
        WHERE character_id = ? AND status = 'success'
        ORDER BY imported_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(character_id)
    .fetch_optional(pool)
    .await?;

    Ok(adapter_id)
}
