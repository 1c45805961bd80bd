// braid-core/src/infrastructure/config/scope.rs
//
// `scope.yml` v1: query-driven discovery. Forge queries produce items;
// selectors narrow them; defaults fill in strategy and base branch.

use std::path::Path;

use serde::Deserialize;

use crate::domain::error::DomainError;
use crate::domain::plan::WeaveStrategy;
use crate::error::BraidError;
use crate::infrastructure::config::load_fragment;

pub const SCOPE_FILE: &str = "scope.yml";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScopeFile {
    pub version: u32,
    pub target: String,
    #[serde(default)]
    pub sources: Vec<ScopeSource>,
    #[serde(default)]
    pub selectors: Option<Selectors>,
    #[serde(default)]
    pub defaults: Option<ScopeDefaults>,
    #[serde(default)]
    pub pin_commits: bool,
    #[serde(default)]
    pub repo: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScopeSource {
    pub query: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Selectors {
    #[serde(default)]
    pub include_labels: Vec<String>,
    #[serde(default)]
    pub exclude_labels: Vec<String>,
}

impl Selectors {
    /// Whether a PR with these labels is in scope.
    pub fn selects(&self, labels: &[String]) -> bool {
        if self
            .exclude_labels
            .iter()
            .any(|ex| labels.iter().any(|l| l == ex))
        {
            return false;
        }
        if self.include_labels.is_empty() {
            return true;
        }
        self.include_labels
            .iter()
            .any(|inc| labels.iter().any(|l| l == inc))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScopeDefaults {
    #[serde(default)]
    pub strategy: Option<WeaveStrategy>,
    #[serde(default)]
    pub base: Option<String>,
}

pub fn load_scope(path: &Path) -> Result<ScopeFile, BraidError> {
    let scope: ScopeFile = load_fragment(path)?;
    if scope.version != 1 {
        return Err(DomainError::UnsupportedSchemaVersion(format!(
            "{}: scope.yml version {}",
            path.display(),
            scope.version
        ))
        .into());
    }
    Ok(scope)
}
