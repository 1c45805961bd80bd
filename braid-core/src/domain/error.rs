// braid-core/src/domain/error.rs

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

/// A single structural problem found while validating a plan document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
    pub code: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.path, self.code, self.message)
    }
}

#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    #[error("Plan validation failed with {} issue(s): {}", issues.len(), summarize(issues))]
    #[diagnostic(
        code(braid::domain::schema),
        help("Run `braid schema validate <file>` for the full issue list.")
    )]
    SchemaValidation { issues: Vec<ValidationIssue> },

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(braid::domain::invalid_json))]
    InvalidJson(String),

    #[error("Unsupported schema version '{0}': expected the 1.x.y line")]
    #[diagnostic(code(braid::domain::schema_version))]
    UnsupportedSchemaVersion(String),

    #[error("Circular dependency detected involving: {0}")]
    #[diagnostic(
        code(braid::domain::cycle),
        help("Break the cycle by dropping one of the listed `deps` edges.")
    )]
    CircularDependency(String),

    #[error("Item '{item}' depends on unknown item '{dep}'")]
    #[diagnostic(code(braid::domain::unknown_dependency))]
    UnknownDependency { item: String, dep: String },

    #[error(
        "Profile role '{role}' is read-only. Use .smartergpt.local or point LEX_PR_PROFILE_DIR at a writable profile"
    )]
    #[diagnostic(code(braid::domain::write_protection))]
    WriteProtection { role: String },

    #[error("Autopilot configuration contradiction: {0}")]
    #[diagnostic(code(braid::domain::config))]
    ConfigContradiction(String),

    #[error("Item '{0}' not found in plan")]
    #[diagnostic(code(braid::domain::item_not_found))]
    ItemNotFound(String),
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .take(3)
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
