//! Import ledger records and results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Import attempt lifecycle: `in_progress`, then exactly one of `success` or `failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    InProgress,
    Success,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::InProgress => "in_progress",
            ImportStatus::Success => "success",
            ImportStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(ImportStatus::InProgress),
            "success" => Ok(ImportStatus::Success),
            "failed" => Ok(ImportStatus::Failed),
            other => Err(format!("Unknown import status: {}", other)),
        }
    }
}

/// How a referenced item was resolved against the master catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    CreatedPersonal,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::CreatedPersonal => "created_personal",
        }
    }
}

impl FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(MatchType::Exact),
            "created_personal" => Ok(MatchType::CreatedPersonal),
            other => Err(format!("Unknown match type: {}", other)),
        }
    }
}

/// One row of `import_histories`
///
/// The raw snapshot is never serialized into API responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportHistory {
    pub id: i64,
    pub user_id: String,
    pub character_id: Option<i64>,
    pub adapter_id: String,
    pub source_format: String,
    pub source_filename: String,
    #[serde(skip)]
    pub source_snapshot: Option<Vec<u8>>,
    pub bmrt_version: String,
    pub imported_at: DateTime<Utc>,
    pub status: ImportStatus,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error_log: String,
    pub updated_at: DateTime<Utc>,
}

/// Values for a fresh `in_progress` history row
#[derive(Debug, Clone)]
pub struct NewImportHistory {
    pub user_id: String,
    pub adapter_id: String,
    pub source_format: String,
    pub source_filename: String,
    /// Gzip-compressed upload
    pub source_snapshot: Vec<u8>,
    /// Adapter extensions, kept as JSON text
    pub mapping_snapshot: Option<String>,
    pub bmrt_version: String,
    pub imported_at: DateTime<Utc>,
}

/// One row of `master_data_imports`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MasterDataImport {
    pub id: i64,
    pub import_history_id: i64,
    pub item_type: String,
    pub item_id: i64,
    pub external_name: String,
    pub match_type: MatchType,
    pub created_at: DateTime<Utc>,
}

/// Severity-free issue reported by validation or a best-effort step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    /// Phase that reported the issue (`bmrt`, `gamesystem`, `provenance`)
    pub source: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>, source: &str) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            source: source.to_string(),
        }
    }
}

/// Result returned to the caller of a successful import
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportResult {
    pub character_id: i64,
    pub import_id: i64,
    pub adapter_id: String,
    pub warnings: Vec<ValidationIssue>,
    /// Personal catalog rows created per collection, e.g. `{"skills": 3}`
    pub created_items: BTreeMap<String, usize>,
    pub status: ImportStatus,
}
