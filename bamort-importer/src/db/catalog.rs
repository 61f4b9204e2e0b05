//! Master catalog queries
//!
//! Every catalog kind lives in its own table; the table name comes from
//! [`CatalogKind::table`], never from input.

use crate::models::{CatalogDetails, CatalogItem, CatalogKind, NewCatalogItem};
use bamort_common::{Error, Result};
use sqlx::{Row, SqliteConnection};

/// Catalog row named exactly `name` in `game_system_id`, lowest id first
pub async fn find_by_name(
    conn: &mut SqliteConnection,
    kind: CatalogKind,
    name: &str,
    game_system_id: i64,
) -> Result<Option<CatalogItem>> {
    let sql = format!(
        "SELECT id, name, game_system_id, personal_item FROM {} WHERE name = ? AND game_system_id = ? ORDER BY id LIMIT 1",
        kind.table()
    );

    let row = sqlx::query(&sql)
        .bind(name)
        .bind(game_system_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(|row| CatalogItem {
        id: row.get("id"),
        kind,
        name: row.get("name"),
        game_system_id: row.get("game_system_id"),
        personal_item: row.get::<i64, _>("personal_item") != 0,
    }))
}

/// Insert a personal catalog row and return it
pub async fn insert_personal(
    conn: &mut SqliteConnection,
    kind: CatalogKind,
    item: &NewCatalogItem,
) -> Result<CatalogItem> {
    let result = match (kind, &item.details) {
        (
            CatalogKind::Skill | CatalogKind::WeaponSkill,
            CatalogDetails::Skill {
                initial_value,
                bonus_attribute,
                improvable,
            },
        ) => {
            let sql = format!(
                r#"
                INSERT INTO {} (name, game_system_id, description, initial_value, bonus_attribute, improvable, source, personal_item)
                VALUES (?, ?, ?, ?, ?, ?, ?, 1)
                "#,
                kind.table()
            );
            sqlx::query(&sql)
                .bind(&item.name)
                .bind(item.game_system_id)
                .bind(&item.description)
                .bind(initial_value)
                .bind(bonus_attribute)
                .bind(*improvable as i64)
                .bind(&item.source)
                .execute(&mut *conn)
                .await?
        }
        (CatalogKind::Spell, CatalogDetails::Spell) => {
            sqlx::query(
                r#"
                INSERT INTO spells (name, game_system_id, description, source, personal_item)
                VALUES (?, ?, ?, ?, 1)
                "#,
            )
            .bind(&item.name)
            .bind(item.game_system_id)
            .bind(&item.description)
            .bind(&item.source)
            .execute(&mut *conn)
            .await?
        }
        (CatalogKind::Weapon | CatalogKind::Equipment, CatalogDetails::Goods { weight, value }) => {
            let sql = format!(
                r#"
                INSERT INTO {} (name, game_system_id, description, weight, value, source, personal_item)
                VALUES (?, ?, ?, ?, ?, ?, 1)
                "#,
                kind.table()
            );
            sqlx::query(&sql)
                .bind(&item.name)
                .bind(item.game_system_id)
                .bind(&item.description)
                .bind(weight)
                .bind(value)
                .bind(&item.source)
                .execute(&mut *conn)
                .await?
        }
        (
            CatalogKind::Container,
            CatalogDetails::Container {
                weight,
                value,
                capacity,
                volume,
            },
        ) => {
            sqlx::query(
                r#"
                INSERT INTO containers (name, game_system_id, description, weight, value, capacity, volume, source, personal_item)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)
                "#,
            )
            .bind(&item.name)
            .bind(item.game_system_id)
            .bind(&item.description)
            .bind(weight)
            .bind(value)
            .bind(capacity)
            .bind(volume)
            .bind(&item.source)
            .execute(&mut *conn)
            .await?
        }
        (kind, details) => {
            return Err(Error::Internal(format!(
                "{:?} details cannot be stored as {}",
                details,
                kind.label()
            )));
        }
    };

    Ok(CatalogItem {
        id: result.last_insert_rowid(),
        kind,
        name: item.name.clone(),
        game_system_id: item.game_system_id,
        personal_item: true,
    })
}
