// braid-core/src/infrastructure/config/deps.rs
//
// `deps.yml` v1: a dependency overlay for query-discovered plans. Each
// `depends_on` entry is one `"<child>: <parent>"` edge; `strategies` maps
// item names to weave strategies.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::domain::error::DomainError;
use crate::domain::plan::WeaveStrategy;
use crate::error::BraidError;
use crate::infrastructure::config::load_fragment;

pub const DEPS_FILE: &str = "deps.yml";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepsFile {
    pub version: u32,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub strategies: BTreeMap<String, WeaveStrategy>,
}

impl DepsFile {
    /// Parses the `"<child>: <parent>"` edge entries.
    pub fn edges(&self) -> Result<Vec<(String, String)>, BraidError> {
        self.depends_on
            .iter()
            .map(|entry| {
                entry
                    .split_once(':')
                    .map(|(child, parent)| {
                        (child.trim().to_string(), parent.trim().to_string())
                    })
                    .filter(|(c, p)| !c.is_empty() && !p.is_empty())
                    .ok_or_else(|| {
                        DomainError::ConfigContradiction(format!(
                            "deps.yml: malformed edge '{entry}' (expected '<child>: <parent>')"
                        ))
                        .into()
                    })
            })
            .collect()
    }
}

pub fn load_deps(path: &Path) -> Result<DepsFile, BraidError> {
    let deps: DepsFile = load_fragment(path)?;
    if deps.version != 1 {
        return Err(DomainError::UnsupportedSchemaVersion(format!(
            "{}: deps.yml version {}",
            path.display(),
            deps.version
        ))
        .into());
    }
    Ok(deps)
}
