// braid-core/src/infrastructure/config/mod.rs

pub mod deps;
pub mod gates;
pub mod scope;
pub mod stack;

use serde::de::DeserializeOwned;
use std::path::Path;

use crate::infrastructure::error::InfrastructureError;

/// Loads a typed configuration fragment from a YAML file.
/// Failures carry the file path and the structured parse cause.
pub(crate) fn load_fragment<T: DeserializeOwned>(path: &Path) -> Result<T, InfrastructureError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        InfrastructureError::ConfigError(format!("failed to read {}: {e}", path.display()))
    })?;
    serde_yaml::from_str(&content).map_err(|e| InfrastructureError::InvalidConfig {
        path: path.display().to_string(),
        cause: e,
    })
}
