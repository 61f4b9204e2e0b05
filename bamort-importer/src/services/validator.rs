//! Rule-based character validation
//!
//! Runs before anything is persisted. Errors block the import, warnings
//! travel with the import result.

use crate::models::{BmrtCharacter, ValidationIssue, CURRENT_BMRT_VERSION};
use serde::Serialize;

/// Combined outcome of the validation rules
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// One check applied to every imported character
pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, character: &BmrtCharacter) -> ValidationReport;
}

/// Ordered list of rules
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    /// Validator with no rules
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Required fields, canonical version and ability score ranges
    pub fn with_default_rules() -> Self {
        let mut validator = Self::new();
        validator.add_rule(Box::new(RequiredFieldsRule));
        validator.add_rule(Box::new(BmrtVersionRule));
        validator.add_rule(Box::new(StatsRangeRule));
        validator
    }

    pub fn add_rule(&mut self, rule: Box<dyn ValidationRule>) {
        self.rules.push(rule);
    }

    pub fn validate(&self, character: &BmrtCharacter) -> ValidationReport {
        let mut report = ValidationReport::default();
        for rule in &self.rules {
            let result = rule.validate(character);
            if !result.is_valid() {
                tracing::debug!(rule = rule.name(), errors = result.errors.len(), "Validation rule failed");
            }
            report.merge(result);
        }
        report
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

/// Character must have a name
pub struct RequiredFieldsRule;

impl ValidationRule for RequiredFieldsRule {
    fn name(&self) -> &'static str {
        "required_fields"
    }

    fn validate(&self, character: &BmrtCharacter) -> ValidationReport {
        let mut report = ValidationReport::default();
        if character.character.name.trim().is_empty() {
            report
                .errors
                .push(ValidationIssue::new("name", "Character name is required", "bmrt"));
        }
        report
    }
}

/// Envelope must declare the supported canonical version
pub struct BmrtVersionRule;

impl ValidationRule for BmrtVersionRule {
    fn name(&self) -> &'static str {
        "bmrt_version"
    }

    fn validate(&self, character: &BmrtCharacter) -> ValidationReport {
        let mut report = ValidationReport::default();
        if !character.is_supported_version() {
            report.errors.push(ValidationIssue::new(
                "bmrt_version",
                format!(
                    "Unsupported BMRT version '{}', expected {}",
                    character.bmrt_version, CURRENT_BMRT_VERSION
                ),
                "bmrt",
            ));
        }
        report
    }
}

/// Ability scores: negative is an error, above 100 a warning
pub struct StatsRangeRule;

impl ValidationRule for StatsRangeRule {
    fn name(&self) -> &'static str {
        "stats_range"
    }

    fn validate(&self, character: &BmrtCharacter) -> ValidationReport {
        let mut report = ValidationReport::default();
        for (label, value) in character.character.attributes.labeled() {
            let field = format!("eigenschaften.{}", label);
            if value < 0 {
                report
                    .errors
                    .push(ValidationIssue::new(field, "Stat cannot be negative", "gamesystem"));
            } else if value > 100 {
                report.warnings.push(ValidationIssue::new(
                    field,
                    "Stat value unusually high (> 100)",
                    "gamesystem",
                ));
            }
        }
        report
    }
}
