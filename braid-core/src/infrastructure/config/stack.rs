// braid-core/src/infrastructure/config/stack.rs
//
// `stack.yml` v1: an explicit, fully-declared set of PRs. Numeric ids are
// the only place numbers appear; the loader maps them to `PR-<n>` names.

use std::path::Path;

use serde::Deserialize;

use crate::domain::error::DomainError;
use crate::domain::plan::WeaveStrategy;
use crate::error::BraidError;
use crate::infrastructure::config::load_fragment;

pub const STACK_FILE: &str = "stack.yml";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackFile {
    pub version: u32,
    pub target: String,
    #[serde(default)]
    pub prs: Vec<StackPr>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackPr {
    pub id: u64,
    pub branch: String,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub needs: Vec<u64>,
    #[serde(default)]
    pub strategy: Option<WeaveStrategy>,
}

pub fn load_stack(path: &Path) -> Result<StackFile, BraidError> {
    let stack: StackFile = load_fragment(path)?;
    if stack.version != 1 {
        return Err(DomainError::UnsupportedSchemaVersion(format!(
            "{}: stack.yml version {}",
            path.display(),
            stack.version
        ))
        .into());
    }
    if stack.target.is_empty() {
        return Err(DomainError::ConfigContradiction(format!(
            "{}: target must be a non-empty branch name",
            path.display()
        ))
        .into());
    }
    for pr in &stack.prs {
        if pr.id == 0 {
            return Err(DomainError::ConfigContradiction(format!(
                "{}: pr ids must be positive",
                path.display()
            ))
            .into());
        }
    }
    Ok(stack)
}
