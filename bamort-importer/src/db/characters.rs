//! Character aggregate persistence
//!
//! A character is one `characters` row plus its ability, point, experience
//! and luck rows, and its skill, spell and possession rows. Possessions keep
//! their full interchange JSON in `payload` so an export can rebuild them.

use crate::models::character::{
    Attributes, Bennies, Container, Equipment, Experience, Points, Skill, Spell, Vehicle, Weapon,
    WeaponSkill,
};
use crate::models::CharacterImport;
use bamort_common::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Values for a new character row
#[derive(Debug, Clone)]
pub struct NewCharacter<'a> {
    pub owner: &'a str,
    pub character: &'a CharacterImport,
    pub game_system_id: i64,
    pub adapter_id: &'a str,
    pub imported_at: DateTime<Utc>,
}

/// Catalog ids resolved for each collection, index-aligned with the character's lists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRefs {
    pub skills: Vec<i64>,
    pub weapon_skills: Vec<i64>,
    pub spells: Vec<i64>,
    pub weapons: Vec<i64>,
    pub equipment: Vec<i64>,
    pub containers: Vec<i64>,
}

/// Character read back from storage
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCharacter {
    pub id: i64,
    pub owner: String,
    pub game_system_id: Option<i64>,
    pub character: CharacterImport,
}

fn to_json<T: Serialize>(value: &T, what: &str) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Internal(format!("Failed to serialize {}: {}", what, e)))
}

fn from_json<T: DeserializeOwned>(text: &str, what: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| Error::Internal(format!("Failed to deserialize {}: {}", what, e)))
}

fn aligned(name: &str, items: usize, refs: usize) -> Result<()> {
    if items != refs {
        return Err(Error::Internal(format!(
            "{} catalog references out of step: {} items, {} ids",
            name, items, refs
        )));
    }
    Ok(())
}

/// Insert the character row with its abilities, points, experience and luck rows
pub async fn insert_character(conn: &mut SqliteConnection, new: &NewCharacter<'_>) -> Result<i64> {
    let c = new.character;

    let result = sqlx::query(
        r#"
        INSERT INTO characters (
            owner, name, race, class, age, salutation, grade, height, weight, faith, hand, image,
            features, stature, specializations, game_system_id, imported_from_adapter, imported_at, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(new.owner)
    .bind(&c.name)
    .bind(&c.race)
    .bind(&c.class)
    .bind(c.age)
    .bind(&c.salutation)
    .bind(c.grade)
    .bind(c.height)
    .bind(c.weight)
    .bind(&c.faith)
    .bind(&c.hand)
    .bind(&c.image)
    .bind(to_json(&c.features, "features")?)
    .bind(to_json(&c.stature, "stature")?)
    .bind(to_json(&c.specializations, "specializations")?)
    .bind(new.game_system_id)
    .bind(new.adapter_id)
    .bind(new.imported_at.to_rfc3339())
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;

    let character_id = result.last_insert_rowid();

    for (name, value) in c.attributes.labeled() {
        sqlx::query("INSERT INTO char_attributes (character_id, name, value) VALUES (?, ?, ?)")
            .bind(character_id)
            .bind(name)
            .bind(value)
            .execute(&mut *conn)
            .await?;
    }

    for (kind, points) in [("lp", c.lp), ("ap", c.ap), ("b", c.b)] {
        sqlx::query("INSERT INTO char_points (character_id, kind, max, value) VALUES (?, ?, ?, ?)")
            .bind(character_id)
            .bind(kind)
            .bind(points.max)
            .bind(points.value)
            .execute(&mut *conn)
            .await?;
    }

    sqlx::query("INSERT INTO char_experience (character_id, value) VALUES (?, ?)")
        .bind(character_id)
        .bind(c.experience.value)
        .execute(&mut *conn)
        .await?;

    sqlx::query("INSERT INTO char_bennies (character_id, gg, gp, sg) VALUES (?, ?, ?, ?)")
        .bind(character_id)
        .bind(c.bennies.gg)
        .bind(c.bennies.gp)
        .bind(c.bennies.sg)
        .execute(&mut *conn)
        .await?;

    Ok(character_id)
}

/// Insert skill, spell and possession rows referencing their catalog ids
pub async fn insert_possessions(
    conn: &mut SqliteConnection,
    character_id: i64,
    character: &CharacterImport,
    refs: &CatalogRefs,
) -> Result<()> {
    aligned("skill", character.skills.len(), refs.skills.len())?;
    aligned("weapon skill", character.weapon_skills.len(), refs.weapon_skills.len())?;
    aligned("spell", character.spells.len(), refs.spells.len())?;
    aligned("weapon", character.weapons.len(), refs.weapons.len())?;
    aligned("equipment", character.equipment.len(), refs.equipment.len())?;
    aligned("container", character.containers.len(), refs.containers.len())?;

    let skill_rows = character
        .skills
        .iter()
        .map(|s| ("skill", &s.name, &s.description, s.value, s.bonus, s.pp, &s.source))
        .zip(&refs.skills)
        .enumerate();
    let weapon_skill_rows = character
        .weapon_skills
        .iter()
        .map(|s| ("weapon_skill", &s.name, &s.description, s.value, s.bonus, s.pp, &s.source))
        .zip(&refs.weapon_skills)
        .enumerate();

    for (position, ((kind, name, description, value, bonus, pp, source), catalog_id)) in
        skill_rows.chain(weapon_skill_rows)
    {
        sqlx::query(
            r#"
            INSERT INTO char_skills (character_id, kind, catalog_id, position, name, description, value, bonus, pp, source)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(character_id)
        .bind(kind)
        .bind(catalog_id)
        .bind(position as i64)
        .bind(name)
        .bind(description)
        .bind(value)
        .bind(bonus)
        .bind(pp)
        .bind(source)
        .execute(&mut *conn)
        .await?;
    }

    for (position, (spell, catalog_id)) in character.spells.iter().zip(&refs.spells).enumerate() {
        sqlx::query(
            r#"
            INSERT INTO char_spells (character_id, catalog_id, position, name, description, bonus, source)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(character_id)
        .bind(catalog_id)
        .bind(position as i64)
        .bind(&spell.name)
        .bind(&spell.description)
        .bind(spell.bonus)
        .bind(&spell.source)
        .execute(&mut *conn)
        .await?;
    }

    for (position, (weapon, catalog_id)) in character.weapons.iter().zip(&refs.weapons).enumerate() {
        insert_item(conn, character_id, "weapon", Some(*catalog_id), position, &weapon.name, weapon).await?;
    }
    for (position, (equipment, catalog_id)) in character.equipment.iter().zip(&refs.equipment).enumerate() {
        insert_item(conn, character_id, "equipment", Some(*catalog_id), position, &equipment.name, equipment)
            .await?;
    }
    for (position, (container, catalog_id)) in character.containers.iter().zip(&refs.containers).enumerate() {
        insert_item(conn, character_id, "container", Some(*catalog_id), position, &container.name, container)
            .await?;
    }
    for (position, vehicle) in character.vehicles.iter().enumerate() {
        insert_item(conn, character_id, "vehicle", None, position, &vehicle.name, vehicle).await?;
    }

    Ok(())
}

async fn insert_item<T: Serialize>(
    conn: &mut SqliteConnection,
    character_id: i64,
    kind: &str,
    catalog_id: Option<i64>,
    position: usize,
    name: &str,
    item: &T,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO char_items (character_id, kind, catalog_id, position, name, payload)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(character_id)
    .bind(kind)
    .bind(catalog_id)
    .bind(position as i64)
    .bind(name)
    .bind(to_json(item, kind)?)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Read a character back into the interchange shape
pub async fn get_character(pool: &SqlitePool, id: i64) -> Result<Option<StoredCharacter>> {
    let Some(row) = sqlx::query(
        r#"
        SELECT c.id, c.owner, c.name, c.race, c.class, c.age, c.salutation, c.grade, c.height,
               c.weight, c.faith, c.hand, c.image, c.features, c.stature, c.specializations,
               c.game_system_id, g.name AS game_system_name
        FROM characters c
        LEFT JOIN game_systems g ON g.id = c.game_system_id
        WHERE c.id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    else {
        return Ok(None);
    };

    let features: String = row.get("features");
    let stature: String = row.get("stature");
    let specializations: String = row.get("specializations");

    let mut character = CharacterImport {
        id: id.to_string(),
        name: row.get("name"),
        race: row.get("race"),
        class: row.get("class"),
        age: row.get("age"),
        salutation: row.get("salutation"),
        grade: row.get("grade"),
        height: row.get("height"),
        weight: row.get("weight"),
        faith: row.get("faith"),
        hand: row.get("hand"),
        image: row.get("image"),
        game_system: row.get("game_system_name"),
        features: from_json(&features, "features")?,
        stature: from_json(&stature, "stature")?,
        specializations: from_json(&specializations, "specializations")?,
        ..Default::default()
    };

    character.attributes = load_attributes(pool, id).await?;
    load_points(pool, id, &mut character).await?;
    load_skills(pool, id, &mut character).await?;
    character.spells = load_spells(pool, id).await?;
    load_items(pool, id, &mut character).await?;

    Ok(Some(StoredCharacter {
        id,
        owner: row.get("owner"),
        game_system_id: row.get("game_system_id"),
        character,
    }))
}

async fn load_attributes(pool: &SqlitePool, id: i64) -> Result<Attributes> {
    let rows = sqlx::query("SELECT name, value FROM char_attributes WHERE character_id = ?")
        .bind(id)
        .fetch_all(pool)
        .await?;

    let mut attributes = Attributes::default();
    for row in rows {
        let name: String = row.get("name");
        attributes.set(&name, row.get("value"));
    }
    Ok(attributes)
}

async fn load_points(pool: &SqlitePool, id: i64, character: &mut CharacterImport) -> Result<()> {
    let rows = sqlx::query("SELECT kind, max, value FROM char_points WHERE character_id = ?")
        .bind(id)
        .fetch_all(pool)
        .await?;

    for row in rows {
        let points = Points {
            max: row.get("max"),
            value: row.get("value"),
        };
        match row.get::<String, _>("kind").as_str() {
            "lp" => character.lp = points,
            "ap" => character.ap = points,
            "b" => character.b = points,
            _ => {}
        }
    }

    let experience: Option<i64> = sqlx::query_scalar("SELECT value FROM char_experience WHERE character_id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    character.experience = Experience {
        value: experience.unwrap_or_default(),
    };

    if let Some(row) = sqlx::query("SELECT gg, gp, sg FROM char_bennies WHERE character_id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
    {
        character.bennies = Bennies {
            gg: row.get("gg"),
            gp: row.get("gp"),
            sg: row.get("sg"),
        };
    }

    Ok(())
}

async fn load_skills(pool: &SqlitePool, id: i64, character: &mut CharacterImport) -> Result<()> {
    let rows = sqlx::query(
        r#"
        SELECT kind, catalog_id, name, description, value, bonus, pp, source
        FROM char_skills
        WHERE character_id = ?
        ORDER BY kind, position
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    for row in rows {
        let catalog_id: i64 = row.get("catalog_id");
        let kind: String = row.get("kind");
        let skill = Skill {
            id: catalog_id.to_string(),
            name: row.get("name"),
            description: row.get("description"),
            value: row.get("value"),
            bonus: row.get("bonus"),
            pp: row.get("pp"),
            source: row.get("source"),
        };

        if kind == "weapon_skill" {
            character.weapon_skills.push(WeaponSkill {
                id: skill.id,
                name: skill.name,
                description: skill.description,
                value: skill.value,
                bonus: skill.bonus,
                pp: skill.pp,
                source: skill.source,
            });
        } else {
            character.skills.push(skill);
        }
    }

    Ok(())
}

async fn load_spells(pool: &SqlitePool, id: i64) -> Result<Vec<Spell>> {
    let rows = sqlx::query(
        r#"
        SELECT catalog_id, name, description, bonus, source
        FROM char_spells
        WHERE character_id = ?
        ORDER BY position
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Spell {
            id: row.get::<i64, _>("catalog_id").to_string(),
            name: row.get("name"),
            description: row.get("description"),
            bonus: row.get("bonus"),
            source: row.get("source"),
        })
        .collect())
}

async fn load_items(pool: &SqlitePool, id: i64, character: &mut CharacterImport) -> Result<()> {
    let rows = sqlx::query("SELECT kind, payload FROM char_items WHERE character_id = ? ORDER BY kind, position")
        .bind(id)
        .fetch_all(pool)
        .await?;

    for row in rows {
        let kind: String = row.get("kind");
        let payload: String = row.get("payload");
        match kind.as_str() {
            "weapon" => character.weapons.push(from_json::<Weapon>(&payload, "weapon")?),
            "equipment" => character.equipment.push(from_json::<Equipment>(&payload, "equipment")?),
            "container" => character.containers.push(from_json::<Container>(&payload, "container")?),
            "vehicle" => character.vehicles.push(from_json::<Vehicle>(&payload, "vehicle")?),
            other => tracing::warn!(character_id = id, kind = %other, "Skipping unknown item kind"),
        }
    }

    Ok(())
}

/// Owner of character `id`, if it exists
pub async fn character_owner(pool: &SqlitePool, id: i64) -> Result<Option<String>> {
    let owner: Option<String> = sqlx::query_scalar("SELECT owner FROM characters WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(owner)
}
