//! Master-data reconciliation
//!
//! Every skill, spell and possession an import references is matched against
//! the master catalog by exact name within the character's game system. A
//! match is reused untouched; otherwise a personal catalog row is created.
//! Either way one provenance row is written. All work runs on the caller's
//! connection, so an open import transaction covers it.

use crate::db::characters::CatalogRefs;
use crate::db::{catalog, game_systems, history};
use crate::models::character::{Container, Equipment, Skill, Spell, Weapon, WeaponSkill};
use crate::models::{
    CatalogDetails, CatalogItem, CatalogKind, CharacterImport, GameSystem, MatchType, NewCatalogItem,
    ValidationIssue,
};
use sqlx::SqliteConnection;
use std::collections::BTreeMap;
use thiserror::Error;

/// Bonus attribute given to skills created during import
const DEFAULT_BONUS_ATTRIBUTE: &str = "check";

/// Reconciliation failure for one item
#[derive(Debug, Error)]
#[error("Failed to reconcile {} '{name}': {source}", .kind.label())]
pub struct ReconcileError {
    pub kind: CatalogKind,
    pub name: String,
    #[source]
    pub source: bamort_common::Error,
}

/// Imported item that can be matched against the catalog
pub trait Reconcilable {
    const KIND: CatalogKind;

    fn name(&self) -> &str;

    /// Personal catalog row to create when nothing matches
    fn to_new_item(&self, game_system_id: i64) -> NewCatalogItem;
}

impl Reconcilable for Skill {
    const KIND: CatalogKind = CatalogKind::Skill;

    fn name(&self) -> &str {
        &self.name
    }

    fn to_new_item(&self, game_system_id: i64) -> NewCatalogItem {
        NewCatalogItem {
            name: self.name.clone(),
            game_system_id,
            description: self.description.clone(),
            source: self.source.clone(),
            details: CatalogDetails::Skill {
                initial_value: self.value,
                bonus_attribute: DEFAULT_BONUS_ATTRIBUTE.to_string(),
                improvable: true,
            },
        }
    }
}

impl Reconcilable for WeaponSkill {
    const KIND: CatalogKind = CatalogKind::WeaponSkill;

    fn name(&self) -> &str {
        &self.name
    }

    fn to_new_item(&self, game_system_id: i64) -> NewCatalogItem {
        NewCatalogItem {
            name: self.name.clone(),
            game_system_id,
            description: self.description.clone(),
            source: self.source.clone(),
            details: CatalogDetails::Skill {
                initial_value: self.value,
                bonus_attribute: DEFAULT_BONUS_ATTRIBUTE.to_string(),
                improvable: true,
            },
        }
    }
}

impl Reconcilable for Spell {
    const KIND: CatalogKind = CatalogKind::Spell;

    fn name(&self) -> &str {
        &self.name
    }

    fn to_new_item(&self, game_system_id: i64) -> NewCatalogItem {
        NewCatalogItem {
            name: self.name.clone(),
            game_system_id,
            description: self.description.clone(),
            source: self.source.clone(),
            details: CatalogDetails::Spell,
        }
    }
}

impl Reconcilable for Weapon {
    const KIND: CatalogKind = CatalogKind::Weapon;

    fn name(&self) -> &str {
        &self.name
    }

    fn to_new_item(&self, game_system_id: i64) -> NewCatalogItem {
        NewCatalogItem {
            name: self.name.clone(),
            game_system_id,
            description: self.description.clone(),
            source: String::new(),
            details: CatalogDetails::Goods {
                weight: self.weight,
                value: self.value,
            },
        }
    }
}

impl Reconcilable for Equipment {
    const KIND: CatalogKind = CatalogKind::Equipment;

    fn name(&self) -> &str {
        &self.name
    }

    fn to_new_item(&self, game_system_id: i64) -> NewCatalogItem {
        NewCatalogItem {
            name: self.name.clone(),
            game_system_id,
            description: self.description.clone(),
            source: String::new(),
            details: CatalogDetails::Goods {
                weight: self.weight,
                value: self.value,
            },
        }
    }
}

impl Reconcilable for Container {
    const KIND: CatalogKind = CatalogKind::Container;

    fn name(&self) -> &str {
        &self.name
    }

    fn to_new_item(&self, game_system_id: i64) -> NewCatalogItem {
        NewCatalogItem {
            name: self.name.clone(),
            game_system_id,
            description: self.description.clone(),
            source: String::new(),
            details: CatalogDetails::Container {
                weight: self.weight,
                value: self.value,
                capacity: self.capacity,
                volume: self.volume,
            },
        }
    }
}

/// Per-import reconciliation state
#[derive(Debug)]
pub struct ReconcileContext {
    pub import_history_id: i64,
    pub game_system: GameSystem,
    /// Best-effort failures, surfaced as import warnings
    pub warnings: Vec<ValidationIssue>,
    /// Personal rows created per collection
    pub created: BTreeMap<String, usize>,
}

impl ReconcileContext {
    pub fn new(import_history_id: i64, game_system: GameSystem) -> Self {
        Self {
            import_history_id,
            game_system,
            warnings: Vec::new(),
            created: BTreeMap::new(),
        }
    }

    /// Resolve the game system for `character` and start a context
    pub async fn for_character(
        conn: &mut SqliteConnection,
        import_history_id: i64,
        character: &CharacterImport,
    ) -> bamort_common::Result<Self> {
        let label = character.game_system_label();
        let game_system = game_systems::resolve_game_system(conn, label).await?;
        tracing::debug!(label, game_system = %game_system.name, "Resolved game system");
        Ok(Self::new(import_history_id, game_system))
    }
}

/// Catalog row an item resolved to
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub item: CatalogItem,
    pub match_type: MatchType,
}

/// Match `item` against the catalog, creating a personal row when none matches
pub async fn reconcile<I: Reconcilable>(
    conn: &mut SqliteConnection,
    item: &I,
    ctx: &mut ReconcileContext,
) -> Result<Reconciled, ReconcileError> {
    let fail = |source| ReconcileError {
        kind: I::KIND,
        name: item.name().to_string(),
        source,
    };
    let game_system_id = ctx.game_system.id;

    let existing = catalog::find_by_name(conn, I::KIND, item.name(), game_system_id)
        .await
        .map_err(fail)?;

    let (found, match_type) = match existing {
        Some(found) => (found, MatchType::Exact),
        None => {
            let created = catalog::insert_personal(conn, I::KIND, &item.to_new_item(game_system_id))
                .await
                .map_err(fail)?;
            *ctx.created.entry(I::KIND.collection().to_string()).or_default() += 1;
            (created, MatchType::CreatedPersonal)
        }
    };

    record_provenance(conn, ctx, &found, item.name(), match_type).await;

    Ok(Reconciled {
        item: found,
        match_type,
    })
}

async fn record_provenance(
    conn: &mut SqliteConnection,
    ctx: &mut ReconcileContext,
    item: &CatalogItem,
    external_name: &str,
    match_type: MatchType,
) {
    let result = history::insert_master_data_import(
        conn,
        ctx.import_history_id,
        item.kind.item_type(),
        item.id,
        external_name,
        match_type,
    )
    .await;

    if let Err(e) = result {
        tracing::warn!(
            import_id = ctx.import_history_id,
            item_type = item.kind.item_type(),
            item_id = item.id,
            error = %e,
            "Failed to record master data provenance"
        );
        ctx.warnings.push(ValidationIssue::new(
            format!("{}:{}", item.kind.item_type(), external_name),
            format!("Provenance not recorded: {}", e),
            "provenance",
        ));
    }
}

async fn reconcile_list<I: Reconcilable>(
    conn: &mut SqliteConnection,
    items: &[I],
    ctx: &mut ReconcileContext,
) -> Result<Vec<i64>, ReconcileError> {
    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        ids.push(reconcile(conn, item, ctx).await?.item.id);
    }
    Ok(ids)
}

/// Reconcile every catalog-backed collection of `character`
///
/// Order: skills, spells, weapon skills, weapons, equipment, containers.
/// Stops at the first failure.
pub async fn reconcile_character(
    conn: &mut SqliteConnection,
    character: &CharacterImport,
    ctx: &mut ReconcileContext,
) -> Result<CatalogRefs, ReconcileError> {
    Ok(CatalogRefs {
        skills: reconcile_list(conn, &character.skills, ctx).await?,
        spells: reconcile_list(conn, &character.spells, ctx).await?,
        weapon_skills: reconcile_list(conn, &character.weapon_skills, ctx).await?,
        weapons: reconcile_list(conn, &character.weapons, ctx).await?,
        equipment: reconcile_list(conn, &character.equipment, ctx).await?,
        containers: reconcile_list(conn, &character.containers, ctx).await?,
    })
}
