//! Canonical character interchange format (BMRT)
//!
//! Field names on the wire are the German names every adapter already
//! speaks; the Rust side uses English names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Supported canonical format version
pub const CURRENT_BMRT_VERSION: &str = "1.0";

/// Magic properties shared by all possessions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Magic {
    pub abw: i64,
    #[serde(rename = "ausgebrannt")]
    pub burned_out: bool,
    #[serde(rename = "ist_magisch")]
    pub is_magic: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Skill {
    pub id: String,
    pub name: String,
    #[serde(rename = "beschreibung")]
    pub description: String,
    #[serde(rename = "fertigkeitswert")]
    pub value: i64,
    pub bonus: i64,
    pub pp: i64,
    #[serde(rename = "quelle")]
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponSkill {
    pub id: String,
    pub name: String,
    #[serde(rename = "beschreibung")]
    pub description: String,
    #[serde(rename = "fertigkeitswert")]
    pub value: i64,
    pub bonus: i64,
    pub pp: i64,
    #[serde(rename = "quelle")]
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spell {
    pub id: String,
    pub name: String,
    #[serde(rename = "beschreibung")]
    pub description: String,
    pub bonus: i64,
    #[serde(rename = "quelle")]
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weapon {
    pub id: String,
    pub name: String,
    #[serde(rename = "beschreibung")]
    pub description: String,
    pub abwb: i64,
    pub anb: i64,
    pub schb: i64,
    #[serde(rename = "anzahl")]
    pub quantity: i64,
    #[serde(rename = "beinhaltet_in")]
    pub contained_in: String,
    #[serde(rename = "gewicht")]
    pub weight: f64,
    #[serde(rename = "magisch")]
    pub magic: Magic,
    #[serde(rename = "nameFuerSpezialisierung")]
    pub specialization_name: String,
    #[serde(rename = "wert")]
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Equipment {
    pub id: String,
    pub name: String,
    #[serde(rename = "beschreibung")]
    pub description: String,
    #[serde(rename = "anzahl")]
    pub quantity: i64,
    #[serde(rename = "beinhaltet_in")]
    pub contained_in: String,
    pub bonus: i64,
    #[serde(rename = "gewicht")]
    pub weight: f64,
    #[serde(rename = "magisch")]
    pub magic: Magic,
    #[serde(rename = "wert")]
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Container {
    pub id: String,
    pub name: String,
    #[serde(rename = "beschreibung")]
    pub description: String,
    #[serde(rename = "beinhaltet_in")]
    pub contained_in: String,
    #[serde(rename = "gewicht")]
    pub weight: f64,
    #[serde(rename = "magisch")]
    pub magic: Magic,
    #[serde(rename = "tragkraft")]
    pub capacity: f64,
    #[serde(rename = "volumen")]
    pub volume: f64,
    #[serde(rename = "wert")]
    pub value: f64,
}

/// Mounts, carts and boats; not reconciled against the catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vehicle {
    pub id: String,
    pub name: String,
    #[serde(rename = "beschreibung")]
    pub description: String,
    #[serde(rename = "beinhaltet_in")]
    pub contained_in: String,
    #[serde(rename = "gewicht")]
    pub weight: f64,
    #[serde(rename = "tragkraft")]
    pub capacity: f64,
    #[serde(rename = "wert")]
    pub value: f64,
    #[serde(rename = "magisch")]
    pub magic: Magic,
}

/// The nine base ability scores
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attributes {
    #[serde(rename = "au")]
    pub appearance: i64,
    #[serde(rename = "gs")]
    pub dexterity: i64,
    #[serde(rename = "gw")]
    pub agility: i64,
    #[serde(rename = "in")]
    pub intelligence: i64,
    #[serde(rename = "ko")]
    pub constitution: i64,
    #[serde(rename = "pa")]
    pub presence: i64,
    #[serde(rename = "st")]
    pub strength: i64,
    #[serde(rename = "wk")]
    pub willpower: i64,
    #[serde(rename = "zt")]
    pub magic_talent: i64,
}

impl Attributes {
    /// Short labels paired with their score, in storage order
    pub fn labeled(&self) -> [(&'static str, i64); 9] {
        [
            ("St", self.strength),
            ("Gs", self.dexterity),
            ("Gw", self.agility),
            ("Ko", self.constitution),
            ("In", self.intelligence),
            ("Zt", self.magic_talent),
            ("Au", self.appearance),
            ("Pa", self.presence),
            ("Wk", self.willpower),
        ]
    }

    /// Set a score by its short label; unknown labels are ignored
    pub fn set(&mut self, label: &str, value: i64) {
        match label.to_ascii_lowercase().as_str() {
            "st" => self.strength = value,
            "gs" => self.dexterity = value,
            "gw" => self.agility = value,
            "ko" => self.constitution = value,
            "in" => self.intelligence = value,
            "zt" => self.magic_talent = value,
            "au" => self.appearance = value,
            "pa" => self.presence = value,
            "wk" => self.willpower = value,
            _ => {}
        }
    }
}

/// A max/current pair (life, action and movement points)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Points {
    pub max: i64,
    pub value: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Experience {
    pub value: i64,
}

/// Luck point triad
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bennies {
    pub gg: i64,
    pub gp: i64,
    pub sg: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    #[serde(rename = "augenfarbe")]
    pub eye_color: String,
    #[serde(rename = "haarfarbe")]
    pub hair_color: String,
    #[serde(rename = "sonstige")]
    pub other: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stature {
    #[serde(rename = "breite")]
    pub build: String,
    #[serde(rename = "groesse")]
    pub size: String,
}

/// Canonical character sheet produced by adapters on import and accepted on export
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterImport {
    pub id: String,
    pub name: String,
    #[serde(rename = "rasse")]
    pub race: String,
    #[serde(rename = "typ")]
    pub class: String,
    #[serde(rename = "alter")]
    pub age: i64,
    #[serde(rename = "anrede")]
    pub salutation: String,
    #[serde(rename = "grad")]
    pub grade: i64,
    #[serde(rename = "groesse")]
    pub height: i64,
    #[serde(rename = "gewicht")]
    pub weight: i64,
    #[serde(rename = "glaube")]
    pub faith: String,
    pub hand: String,
    /// Game system label; when absent the class label is tried
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_system: Option<String>,
    #[serde(rename = "fertigkeiten")]
    pub skills: Vec<Skill>,
    #[serde(rename = "zauber")]
    pub spells: Vec<Spell>,
    pub lp: Points,
    #[serde(rename = "eigenschaften")]
    pub attributes: Attributes,
    #[serde(rename = "merkmale")]
    pub features: Features,
    pub bennies: Bennies,
    #[serde(rename = "gestalt")]
    pub stature: Stature,
    pub ap: Points,
    pub b: Points,
    #[serde(rename = "erfahrungsschatz")]
    pub experience: Experience,
    #[serde(rename = "transportmittel")]
    pub vehicles: Vec<Vehicle>,
    #[serde(rename = "ausruestung")]
    pub equipment: Vec<Equipment>,
    #[serde(rename = "behaeltnisse")]
    pub containers: Vec<Container>,
    #[serde(rename = "waffen")]
    pub weapons: Vec<Weapon>,
    #[serde(rename = "waffenfertigkeiten")]
    pub weapon_skills: Vec<WeaponSkill>,
    #[serde(rename = "spezialisierung")]
    pub specializations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl CharacterImport {
    /// Label used to resolve the game system
    pub fn game_system_label(&self) -> &str {
        self.game_system
            .as_deref()
            .filter(|label| !label.trim().is_empty())
            .unwrap_or(&self.class)
    }
}

/// Provenance block attached by the adapter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceMetadata {
    pub source_format: String,
    pub adapter_id: String,
    pub imported_at: Option<DateTime<Utc>>,
}

/// Versioned envelope adapters return from `POST /import`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BmrtCharacter {
    #[serde(flatten)]
    pub character: CharacterImport,
    #[serde(default)]
    pub bmrt_version: String,
    /// Adapter-specific data the canonical shape has no room for
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
    #[serde(rename = "_metadata", default)]
    pub metadata: SourceMetadata,
}

impl BmrtCharacter {
    /// Wrap a character in a current-version envelope
    pub fn new(character: CharacterImport, adapter_id: &str, source_format: &str) -> Self {
        Self {
            character,
            bmrt_version: CURRENT_BMRT_VERSION.to_string(),
            extensions: Map::new(),
            metadata: SourceMetadata {
                source_format: source_format.to_string(),
                adapter_id: adapter_id.to_string(),
                imported_at: Some(Utc::now()),
            },
        }
    }

    pub fn is_supported_version(&self) -> bool {
        self.bmrt_version == CURRENT_BMRT_VERSION
    }
}
