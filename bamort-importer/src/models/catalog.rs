//! Master catalog records

use serde::Serialize;

/// Kinds of game-rule item kept in the master catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    Skill,
    WeaponSkill,
    Spell,
    Weapon,
    Equipment,
    Container,
}

impl CatalogKind {
    /// Catalog table holding this kind
    pub fn table(&self) -> &'static str {
        match self {
            CatalogKind::Skill => "skills",
            CatalogKind::WeaponSkill => "weapon_skills",
            CatalogKind::Spell => "spells",
            CatalogKind::Weapon => "weapons",
            CatalogKind::Equipment => "equipment",
            CatalogKind::Container => "containers",
        }
    }

    /// `item_type` recorded in provenance rows
    pub fn item_type(&self) -> &'static str {
        match self {
            CatalogKind::Skill => "skill",
            CatalogKind::WeaponSkill => "weapon_skill",
            CatalogKind::Spell => "spell",
            CatalogKind::Weapon => "weapon",
            CatalogKind::Equipment => "equipment",
            CatalogKind::Container => "container",
        }
    }

    /// Key used in `ImportResult::created_items`
    pub fn collection(&self) -> &'static str {
        match self {
            CatalogKind::Skill => "skills",
            CatalogKind::WeaponSkill => "weapon_skills",
            CatalogKind::Spell => "spells",
            CatalogKind::Weapon => "weapons",
            CatalogKind::Equipment => "equipment",
            CatalogKind::Container => "containers",
        }
    }

    /// Human readable label for error logs
    pub fn label(&self) -> &'static str {
        match self {
            CatalogKind::Skill => "skill",
            CatalogKind::WeaponSkill => "weapon skill",
            CatalogKind::Spell => "spell",
            CatalogKind::Weapon => "weapon",
            CatalogKind::Equipment => "equipment",
            CatalogKind::Container => "container",
        }
    }
}

/// Ruleset a catalog row belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameSystem {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub is_default: bool,
}

/// Catalog row as read back for matching
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogItem {
    pub id: i64,
    pub kind: CatalogKind,
    pub name: String,
    pub game_system_id: i64,
    pub personal_item: bool,
}

/// Kind-specific columns of a new catalog row
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogDetails {
    Skill {
        initial_value: i64,
        bonus_attribute: String,
        improvable: bool,
    },
    Spell,
    Goods {
        weight: f64,
        value: f64,
    },
    Container {
        weight: f64,
        value: f64,
        capacity: f64,
        volume: f64,
    },
}

/// Personal catalog row about to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewCatalogItem {
    pub name: String,
    pub game_system_id: i64,
    pub description: String,
    pub source: String,
    pub details: CatalogDetails,
}
