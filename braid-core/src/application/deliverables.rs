// braid-core/src/application/deliverables.rs
//
// Timestamped, hashed, manifest-backed output directories. Each L>=1 run
// produces `<profile>/deliverables/weave-<ts>/` plus a `latest` file whose
// single line names the newest run directory; readers observe either the
// old or the new value because the file is replaced atomically.

use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::domain::plan::canonical_json;
use crate::error::BraidError;
use crate::infrastructure::env::Env;
use crate::infrastructure::fs::atomic_write;
use crate::infrastructure::profile::Profile;

pub const MANIFEST_SCHEMA_VERSION: &str = "1.0.0";
const RUN_DIR_PREFIX: &str = "weave-";
const LATEST_FILE: &str = "latest";
const TS_FORMAT: &str = "%Y%m%dT%H%M%SZ";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: String,
    pub plan_hash: String,
    pub level_executed: u8,
    pub runner_version: String,
    pub created_at: String,
    pub artifacts: Vec<ManifestArtifact>,
    pub execution_context: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestArtifact {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub hash: String,
    pub size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RetentionPolicy {
    pub max_count: Option<usize>,
    pub max_age_days: Option<i64>,
    pub keep_latest: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub removed: Vec<String>,
    pub freed_bytes: u64,
}

pub struct DeliverablesManager<'a> {
    env: &'a Env,
    root: PathBuf,
}

/// An open run directory accumulating artifacts; `finalize` seals the
/// manifest and flips `latest`.
pub struct RunDir {
    dir: PathBuf,
    manifest: Manifest,
}

impl<'a> DeliverablesManager<'a> {
    pub fn new(env: &'a Env, profile: &Profile) -> Self {
        Self {
            env,
            root: profile.deliverables_dir(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn begin_run(
        &self,
        plan_hash: &str,
        level: u8,
        execution_context: Value,
    ) -> Result<RunDir, BraidError> {
        let dir = self
            .root
            .join(format!("{RUN_DIR_PREFIX}{}", self.env.timestamp_compact()));
        std::fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "deliverables run directory created");

        Ok(RunDir {
            dir,
            manifest: Manifest {
                schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
                plan_hash: plan_hash.to_string(),
                level_executed: level,
                runner_version: env!("CARGO_PKG_VERSION").to_string(),
                created_at: self.env.timestamp_iso(),
                artifacts: Vec::new(),
                execution_context,
            },
        })
    }

    /// Seals the manifest, then atomically repoints `latest`.
    pub fn finalize(&self, run: RunDir) -> Result<PathBuf, BraidError> {
        let manifest_rendered = canonical_json(&run.manifest)?;
        atomic_write(run.dir.join("manifest.json"), manifest_rendered)?;

        let name = run
            .dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        atomic_write(self.root.join(LATEST_FILE), format!("{name}\n"))?;
        info!(run = %name, "deliverables finalized");
        Ok(run.dir)
    }

    /// The run directory `latest` points at, if any.
    pub fn latest(&self) -> Option<PathBuf> {
        let name = std::fs::read_to_string(self.root.join(LATEST_FILE)).ok()?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let dir = self.root.join(name);
        dir.is_dir().then_some(dir)
    }

    /// Deletes run directories beyond `max_count` (newest kept first)
    /// and/or older than `max_age_days`. With `keep_latest`, the single
    /// newest run always survives even if it violates the age limit.
    pub fn cleanup(&self, policy: &RetentionPolicy) -> Result<CleanupReport, BraidError> {
        let mut runs: Vec<(String, PathBuf)> = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with(RUN_DIR_PREFIX) && entry.path().is_dir() {
                    runs.push((name, entry.path()));
                }
            }
        }
        // Compact timestamps sort lexicographically: newest first
        runs.sort_by(|a, b| b.0.cmp(&a.0));

        let now = self.env.now();
        let mut report = CleanupReport::default();

        for (index, (name, path)) in runs.iter().enumerate() {
            if policy.keep_latest && index == 0 {
                continue;
            }

            let over_count = policy.max_count.map(|max| index >= max).unwrap_or(false);
            let over_age = policy
                .max_age_days
                .zip(parse_run_timestamp(name))
                .map(|(max, created)| (now - created).num_days() > max)
                .unwrap_or(false);
            if !over_count && !over_age {
                continue;
            }

            // Path guard: never delete outside the deliverables root
            if !path.starts_with(&self.root) {
                return Err(BraidError::UnsafePath(path.display().to_string()));
            }

            report.freed_bytes += dir_size(path);
            std::fs::remove_dir_all(path)?;
            println!("   🗑️  Deliverables removed: {name}");
            report.removed.push(name.clone());
        }

        Ok(report)
    }
}

impl RunDir {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes one artifact and registers its hash and size in the
    /// manifest, in write order.
    pub fn write_artifact(
        &mut self,
        name: &str,
        kind: &str,
        bytes: impl AsRef<[u8]>,
    ) -> Result<PathBuf, BraidError> {
        let bytes = bytes.as_ref();
        let path = self.dir.join(name);
        atomic_write(&path, bytes)?;

        let mut hasher = Sha256::new();
        hasher.update(bytes);
        self.manifest.artifacts.push(ManifestArtifact {
            name: name.to_string(),
            kind: kind.to_string(),
            hash: hex::encode(hasher.finalize()),
            size: bytes.len() as u64,
        });
        Ok(path)
    }

    pub fn artifact_count(&self) -> usize {
        self.manifest.artifacts.len()
    }
}

fn parse_run_timestamp(dir_name: &str) -> Option<chrono::DateTime<Utc>> {
    let raw = dir_name.strip_prefix(RUN_DIR_PREFIX)?;
    let naive = NaiveDateTime::parse_from_str(raw, TS_FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

fn dir_size(path: &Path) -> u64 {
    walkdir::WalkDir::new(path)
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::tempdir;

    fn profile_in(dir: &Path) -> Profile {
        Profile {
            role: "local".into(),
            name: "test".into(),
            dir: dir.to_path_buf(),
        }
    }

    fn env_at(ts: &str) -> Env {
        Env {
            deterministic_time: Some(
                chrono::DateTime::parse_from_rfc3339(ts)
                    .unwrap()
                    .with_timezone(&Utc),
            ),
            ..Env::bare()
        }
    }

    #[test]
    fn test_manifest_lists_exactly_what_was_written() -> Result<()> {
        let tmp = tempdir()?;
        let profile = profile_in(tmp.path());
        let env = env_at("2026-08-01T12:00:00Z");
        let manager = DeliverablesManager::new(&env, &profile);

        let mut run = manager.begin_run("abc123", 1, json!({"command": "autopilot"}))?;
        run.write_artifact("analysis.json", "application/json", b"{}\n")?;
        run.write_artifact("weave-report.md", "text/markdown", b"# report\n")?;
        let dir = manager.finalize(run)?;

        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("manifest.json"))?)?;
        let artifacts = manifest["artifacts"].as_array().unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(manifest["planHash"], "abc123");
        assert_eq!(manifest["levelExecuted"], 1);
        assert_eq!(manifest["createdAt"], "2026-08-01T12:00:00Z");

        // Each entry's hash matches the SHA-256 of its file bytes
        for artifact in artifacts {
            let bytes = std::fs::read(dir.join(artifact["name"].as_str().unwrap()))?;
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            assert_eq!(artifact["hash"], hex::encode(hasher.finalize()));
            assert_eq!(artifact["size"], bytes.len() as u64);
        }
        Ok(())
    }

    #[test]
    fn test_latest_points_at_newest_run() -> Result<()> {
        let tmp = tempdir()?;
        let profile = profile_in(tmp.path());

        let env1 = env_at("2026-08-01T10:00:00Z");
        let manager1 = DeliverablesManager::new(&env1, &profile);
        manager1.finalize(manager1.begin_run("h1", 1, json!({}))?)?;

        let env2 = env_at("2026-08-01T11:00:00Z");
        let manager2 = DeliverablesManager::new(&env2, &profile);
        let newest = manager2.finalize(manager2.begin_run("h2", 1, json!({}))?)?;

        assert_eq!(manager2.latest(), Some(newest));
        Ok(())
    }

    #[test]
    fn test_cleanup_max_count_keep_latest() -> Result<()> {
        let tmp = tempdir()?;
        let profile = profile_in(tmp.path());

        // Three runs at d1 < d2 < d3
        for (ts, payload) in [
            ("2026-08-01T10:00:00Z", "first"),
            ("2026-08-01T11:00:00Z", "second"),
            ("2026-08-01T12:00:00Z", "third"),
        ] {
            let env = env_at(ts);
            let manager = DeliverablesManager::new(&env, &profile);
            let mut run = manager.begin_run("h", 1, json!({}))?;
            run.write_artifact("analysis.json", "application/json", payload)?;
            manager.finalize(run)?;
        }

        let env = env_at("2026-08-01T12:30:00Z");
        let manager = DeliverablesManager::new(&env, &profile);
        let report = manager.cleanup(&RetentionPolicy {
            max_count: Some(2),
            max_age_days: None,
            keep_latest: true,
        })?;

        assert_eq!(report.removed, vec!["weave-20260801T100000Z".to_string()]);
        assert!(report.freed_bytes > 0);
        assert!(manager.root().join("weave-20260801T110000Z").exists());
        assert!(manager.root().join("weave-20260801T120000Z").exists());
        Ok(())
    }

    #[test]
    fn test_cleanup_keep_latest_beats_age() -> Result<()> {
        let tmp = tempdir()?;
        let profile = profile_in(tmp.path());

        let env = env_at("2026-07-01T12:00:00Z");
        let manager = DeliverablesManager::new(&env, &profile);
        manager.finalize(manager.begin_run("h", 1, json!({}))?)?;

        // A month later, everything violates the age limit
        let later = env_at("2026-08-01T12:00:00Z");
        let manager = DeliverablesManager::new(&later, &profile);
        let report = manager.cleanup(&RetentionPolicy {
            max_count: None,
            max_age_days: Some(7),
            keep_latest: true,
        })?;

        assert!(report.removed.is_empty());
        assert!(manager.root().join("weave-20260701T120000Z").exists());
        Ok(())
    }
}
