// braid-core/src/infrastructure/config/gates.rs
//
// `gates.yml`: ordered gate definitions keyed by item name. The literal
// key "*" supplies gates for items without an explicit entry, which is how
// query-discovered PR sets get a uniform gate suite.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::domain::plan::Gate;
use crate::error::BraidError;
use crate::infrastructure::config::load_fragment;

pub const GATES_FILE: &str = "gates.yml";
pub const WILDCARD_KEY: &str = "*";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct GatesFile(pub BTreeMap<String, Vec<Gate>>);

impl GatesFile {
    /// Gates for one item: the exact key wins, then the wildcard.
    pub fn gates_for(&self, item: &str) -> Vec<Gate> {
        self.0
            .get(item)
            .or_else(|| self.0.get(WILDCARD_KEY))
            .cloned()
            .unwrap_or_default()
    }
}

pub fn load_gates(path: &Path) -> Result<GatesFile, BraidError> {
    Ok(load_fragment(path)?)
}
