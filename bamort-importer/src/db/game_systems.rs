//! Game system lookup

use crate::models::GameSystem;
use bamort_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

fn from_row(row: &SqliteRow) -> GameSystem {
    GameSystem {
        id: row.get("id"),
        code: row.get("code"),
        name: row.get("name"),
        is_default: row.get::<i64, _>("is_default") != 0,
    }
}

/// Resolve a character's game system label
///
/// The label is matched against the code first, then the name, both
/// case-insensitively. Anything else falls back to the default system.
pub async fn resolve_game_system(conn: &mut SqliteConnection, label: &str) -> Result<GameSystem> {
    let label = label.trim();

    if !label.is_empty() {
        let row = sqlx::query(
            r#"
            SELECT id, code, name, is_default
            FROM game_systems
            WHERE is_active = 1
              AND (code = ?1 COLLATE NOCASE OR name = ?1 COLLATE NOCASE)
            ORDER BY (code = ?1 COLLATE NOCASE) DESC, id
            LIMIT 1
            "#,
        )
        .bind(label)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(row) = row {
            return Ok(from_row(&row));
        }
    }

    default_game_system(conn).await
}

/// The system flagged as default
pub async fn default_game_system(conn: &mut SqliteConnection) -> Result<GameSystem> {
    let row = sqlx::query(
        "SELECT id, code, name, is_default FROM game_systems WHERE is_default = 1 ORDER BY id LIMIT 1",
    )
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|row| from_row(&row))
        .ok_or_else(|| Error::NotFound("default game system".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bamort_common::db::{init_memory_database, DEFAULT_GAME_SYSTEM_CODE};

    #[tokio::test]
    async fn test_resolves_by_code_name_and_default() {
        let pool = init_memory_database().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        sqlx::query("INSERT INTO game_systems (code, name) VALUES ('DSA', 'Das Schwarze Auge')")
            .execute(&mut *conn)
            .await
            .unwrap();

        let by_code = resolve_game_system(&mut conn, "m5").await.unwrap();
        assert_eq!(by_code.code, DEFAULT_GAME_SYSTEM_CODE);

        let by_name = resolve_game_system(&mut conn, "Midgard").await.unwrap();
        assert_eq!(by_name.id, by_code.id);

        let other = resolve_game_system(&mut conn, "das schwarze auge").await.unwrap();
        assert_eq!(other.code, "DSA");
        assert!(!other.is_default);

        let fallback = resolve_game_system(&mut conn, "Krieger").await.unwrap();
        assert!(fallback.is_default);
        assert_eq!(fallback.id, by_code.id);

        let empty = resolve_game_system(&mut conn, "  ").await.unwrap();
        assert!(empty.is_default);
    }
}
