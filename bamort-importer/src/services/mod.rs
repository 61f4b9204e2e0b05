//! Import and export services
//!
//! The orchestrator drives an import through detection, the adapter,
//! validation and reconciliation; the exporter sends stored characters back
//! out through an adapter.

pub mod detector;
pub mod exporter;
pub mod orchestrator;
pub mod reconciler;
pub mod validator;

pub use detector::Detector;
pub use exporter::{ExportError, ExportedFile, Exporter};
pub use orchestrator::{ImportError, ImportOrchestrator, ImportRequest};
pub use reconciler::{reconcile, reconcile_character, ReconcileContext, ReconcileError};
pub use validator::{ValidationReport, ValidationRule, Validator};
