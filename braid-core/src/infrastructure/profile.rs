// braid-core/src/infrastructure/profile.rs
//
// A profile is a directory of configuration files with a declared role.
// Role "example" is read-only; every write path must go through
// `ensure_writable` before touching the directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::error::DomainError;
use crate::error::BraidError;
use crate::infrastructure::env::Env;
use crate::infrastructure::error::InfrastructureError;

pub const EXAMPLE_ROLE: &str = "example";
pub const LOCAL_DIR: &str = ".smartergpt.local";
pub const SHARED_DIR: &str = ".smartergpt";
const MANIFEST_FILE: &str = "profile.yml";

/// The on-disk `profile.yml` manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileManifest {
    pub role: String,
    pub name: String,
}

/// A resolved profile: role, display name and root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub role: String,
    pub name: String,
    pub dir: PathBuf,
}

impl Profile {
    /// Resolves the profile once per process. The env override wins;
    /// otherwise `<cwd>/.smartergpt.local` is preferred over
    /// `<cwd>/.smartergpt`. A directory without a manifest gets role
    /// "example" and is therefore read-only.
    #[instrument(skip(env, cwd))]
    pub fn resolve(env: &Env, cwd: &Path) -> Result<Profile, BraidError> {
        let dir = if let Some(explicit) = &env.profile_dir {
            explicit.clone()
        } else {
            let local = cwd.join(LOCAL_DIR);
            let shared = cwd.join(SHARED_DIR);
            if local.is_dir() {
                local
            } else if shared.is_dir() {
                shared
            } else {
                // Nothing on disk yet: the shared location with the
                // read-only example role. `bootstrap` seeds a writable
                // profile elsewhere.
                shared
            }
        };

        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest = if manifest_path.is_file() {
            let content = std::fs::read_to_string(&manifest_path)
                .map_err(InfrastructureError::Io)?;
            serde_yaml::from_str::<ProfileManifest>(&content).map_err(|e| {
                InfrastructureError::InvalidConfig {
                    path: manifest_path.display().to_string(),
                    cause: e,
                }
            })?
        } else {
            ProfileManifest {
                role: EXAMPLE_ROLE.to_string(),
                name: dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "default".to_string()),
            }
        };

        debug!(dir = %dir.display(), role = %manifest.role, "profile resolved");
        Ok(Profile {
            role: manifest.role,
            name: manifest.name,
            dir,
        })
    }

    pub fn can_write(&self) -> bool {
        self.role != EXAMPLE_ROLE
    }

    /// Refuses writes into a read-only profile before any filesystem
    /// mutation happens.
    pub fn ensure_writable(&self) -> Result<(), DomainError> {
        if self.can_write() {
            Ok(())
        } else {
            Err(DomainError::WriteProtection {
                role: self.role.clone(),
            })
        }
    }

    pub fn runner_dir(&self) -> PathBuf {
        self.dir.join("runner")
    }

    pub fn gate_results_dir(&self) -> PathBuf {
        self.runner_dir().join("gate-results")
    }

    pub fn deliverables_dir(&self) -> PathBuf {
        self.dir.join("deliverables")
    }

    /// Path of a config file inside the profile.
    pub fn config_path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }
}

/// Writes a fresh manifest; used by bootstrap when seeding a new profile.
pub fn write_manifest(dir: &Path, manifest: &ProfileManifest) -> Result<(), BraidError> {
    let rendered =
        serde_yaml::to_string(manifest).map_err(|e| InfrastructureError::ConfigError(e.to_string()))?;
    crate::infrastructure::fs::atomic_write(dir.join(MANIFEST_FILE), rendered)?;
    Ok(())
}
