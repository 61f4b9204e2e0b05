//! Database Test Utilities

use anyhow::Result;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Create a file-backed test database with the full schema
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_importer.db");

    let pool = bamort_common::db::init_database(&db_path).await?;

    Ok((temp_dir, pool))
}

/// Row count of `table`
pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    let query = format!("SELECT COUNT(*) FROM {}", table);
    sqlx::query_scalar(&query).fetch_one(pool).await.unwrap()
}
