//! Database initialization
//!
//! Opens (or creates) the SQLite file and creates every table the importer
//! reads or writes. All statements are `CREATE ... IF NOT EXISTS`, so running
//! initialization against an existing database is a no-op.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Code of the game system seeded on first run
pub const DEFAULT_GAME_SYSTEM_CODE: &str = "M5";

/// Name of the game system seeded on first run
pub const DEFAULT_GAME_SYSTEM_NAME: &str = "midgard";

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the full schema
///
/// The pool never recycles its connection, since closing it would discard
/// the database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and seed reference rows (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_game_systems_table(pool).await?;

    // Master catalog
    create_skills_table(pool, "skills").await?;
    create_skills_table(pool, "weapon_skills").await?;
    create_spells_table(pool).await?;
    create_equipment_table(pool, "weapons").await?;
    create_equipment_table(pool, "equipment").await?;
    create_containers_table(pool).await?;

    // Character aggregate
    create_characters_table(pool).await?;
    create_character_detail_tables(pool).await?;

    // Import ledger
    create_import_histories_table(pool).await?;
    create_master_data_imports_table(pool).await?;

    seed_default_game_system(pool).await?;

    Ok(())
}

async fn create_game_systems_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS game_systems (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            is_active INTEGER NOT NULL DEFAULT 1,
            is_default INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn seed_default_game_system(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO game_systems (code, name, description, is_active, is_default)
        VALUES (?, ?, 'Midgard 5', 1, 1)
        "#,
    )
    .bind(DEFAULT_GAME_SYSTEM_CODE)
    .bind(DEFAULT_GAME_SYSTEM_NAME)
    .execute(pool)
    .await?;

    Ok(())
}

// Table names below come from the fixed call sites in create_schema,
// never from input.

async fn create_skills_table(pool: &SqlitePool, table: &str) -> Result<()> {
    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            game_system_id INTEGER NOT NULL REFERENCES game_systems(id),
            description TEXT NOT NULL DEFAULT '',
            initial_value INTEGER NOT NULL DEFAULT 0,
            bonus_attribute TEXT NOT NULL DEFAULT 'check',
            improvable INTEGER NOT NULL DEFAULT 1,
            source TEXT NOT NULL DEFAULT '',
            personal_item INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#
    );
    sqlx::query(&sql).execute(pool).await?;

    let index = format!(
        "CREATE INDEX IF NOT EXISTS idx_{table}_name_system ON {table}(name, game_system_id)"
    );
    sqlx::query(&index).execute(pool).await?;

    Ok(())
}

async fn create_spells_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS spells (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            game_system_id INTEGER NOT NULL REFERENCES game_systems(id),
            description TEXT NOT NULL DEFAULT '',
            source TEXT NOT NULL DEFAULT '',
            personal_item INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_spells_name_system ON spells(name, game_system_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_equipment_table(pool: &SqlitePool, table: &str) -> Result<()> {
    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            game_system_id INTEGER NOT NULL REFERENCES game_systems(id),
            description TEXT NOT NULL DEFAULT '',
            weight REAL NOT NULL DEFAULT 0,
            value REAL NOT NULL DEFAULT 0,
            source TEXT NOT NULL DEFAULT '',
            personal_item INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#
    );
    sqlx::query(&sql).execute(pool).await?;

    let index = format!(
        "CREATE INDEX IF NOT EXISTS idx_{table}_name_system ON {table}(name, game_system_id)"
    );
    sqlx::query(&index).execute(pool).await?;

    Ok(())
}

async fn create_containers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS containers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            game_system_id INTEGER NOT NULL REFERENCES game_systems(id),
            description TEXT NOT NULL DEFAULT '',
            weight REAL NOT NULL DEFAULT 0,
            value REAL NOT NULL DEFAULT 0,
            capacity REAL NOT NULL DEFAULT 0,
            volume REAL NOT NULL DEFAULT 0,
            source TEXT NOT NULL DEFAULT '',
            personal_item INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_containers_name_system ON containers(name, game_system_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_characters_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS characters (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner TEXT NOT NULL,
            name TEXT NOT NULL,
            race TEXT NOT NULL DEFAULT '',
            class TEXT NOT NULL DEFAULT '',
            age INTEGER NOT NULL DEFAULT 0,
            salutation TEXT NOT NULL DEFAULT '',
            grade INTEGER NOT NULL DEFAULT 0,
            height INTEGER NOT NULL DEFAULT 0,
            weight INTEGER NOT NULL DEFAULT 0,
            faith TEXT NOT NULL DEFAULT '',
            hand TEXT NOT NULL DEFAULT '',
            image TEXT,
            features TEXT NOT NULL DEFAULT '{}',
            stature TEXT NOT NULL DEFAULT '{}',
            specializations TEXT NOT NULL DEFAULT '[]',
            game_system_id INTEGER REFERENCES game_systems(id),
            imported_from_adapter TEXT,
            imported_at TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_characters_owner ON characters(owner)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_character_detail_tables(pool: &SqlitePool) -> Result<()> {
    // Nine rows per character, one per base ability
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS char_attributes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            character_id INTEGER NOT NULL REFERENCES characters(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            value INTEGER NOT NULL DEFAULT 0,
            UNIQUE (character_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Life, action and movement points ('lp', 'ap', 'b')
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS char_points (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            character_id INTEGER NOT NULL REFERENCES characters(id) ON DELETE CASCADE,
            kind TEXT NOT NULL CHECK (kind IN ('lp', 'ap', 'b')),
            max INTEGER NOT NULL DEFAULT 0,
            value INTEGER NOT NULL DEFAULT 0,
            UNIQUE (character_id, kind)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS char_experience (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            character_id INTEGER NOT NULL UNIQUE REFERENCES characters(id) ON DELETE CASCADE,
            value INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS char_bennies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            character_id INTEGER NOT NULL UNIQUE REFERENCES characters(id) ON DELETE CASCADE,
            gg INTEGER NOT NULL DEFAULT 0,
            gp INTEGER NOT NULL DEFAULT 0,
            sg INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Skills and weapon skills ('skill', 'weapon_skill')
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS char_skills (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            character_id INTEGER NOT NULL REFERENCES characters(id) ON DELETE CASCADE,
            kind TEXT NOT NULL CHECK (kind IN ('skill', 'weapon_skill')),
            catalog_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            value INTEGER NOT NULL DEFAULT 0,
            bonus INTEGER NOT NULL DEFAULT 0,
            pp INTEGER NOT NULL DEFAULT 0,
            source TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS char_spells (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            character_id INTEGER NOT NULL REFERENCES characters(id) ON DELETE CASCADE,
            catalog_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            bonus INTEGER NOT NULL DEFAULT 0,
            source TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Possessions; payload holds the full interchange JSON of the item.
    // Vehicles are not part of the catalog and carry no catalog_id.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS char_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            character_id INTEGER NOT NULL REFERENCES characters(id) ON DELETE CASCADE,
            kind TEXT NOT NULL CHECK (kind IN ('weapon', 'equipment', 'container', 'vehicle')),
            catalog_id INTEGER,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            payload TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    for table in ["char_skills", "char_spells", "char_items"] {
        let index = format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_character ON {table}(character_id)"
        );
        sqlx::query(&index).execute(pool).await?;
    }

    Ok(())
}

async fn create_import_histories_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS import_histories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            character_id INTEGER,
            adapter_id TEXT NOT NULL,
            source_format TEXT NOT NULL DEFAULT '',
            source_filename TEXT NOT NULL DEFAULT '',
            source_snapshot BLOB,
            mapping_snapshot TEXT,
            bmrt_version TEXT NOT NULL DEFAULT '',
            imported_at TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('in_progress', 'success', 'failed')),
            error_log TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_import_histories_user ON import_histories(user_id, imported_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_import_histories_character ON import_histories(character_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_master_data_imports_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS master_data_imports (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            import_history_id INTEGER NOT NULL REFERENCES import_histories(id),
            item_type TEXT NOT NULL,
            item_id INTEGER NOT NULL,
            external_name TEXT NOT NULL,
            match_type TEXT NOT NULL CHECK (match_type IN ('exact', 'created_personal')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_master_data_imports_history ON master_data_imports(import_history_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
