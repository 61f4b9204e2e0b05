//! Data models for bamort-importer

pub mod adapter;
pub mod catalog;
pub mod character;
pub mod history;

pub use adapter::{AdapterMetadata, Capability, DetectResponse, Detection, DetectionMethod};
pub use catalog::{CatalogDetails, CatalogItem, CatalogKind, GameSystem, NewCatalogItem};
pub use character::{BmrtCharacter, CharacterImport, SourceMetadata, CURRENT_BMRT_VERSION};
pub use history::{
    ImportHistory, ImportResult, ImportStatus, MasterDataImport, MatchType, NewImportHistory,
    ValidationIssue,
};
