// braid-core/src/domain/report.rs
//
// Persisted per-gate execution records. Readers must accept the
// pre-migration field names (`result`, `duration`, `start_time`) still
// found in older result files.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    Pass,
    Fail,
    Skip,
}

impl std::fmt::Display for GateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GateStatus::Pass => "pass",
            GateStatus::Fail => "fail",
            GateStatus::Skip => "skip",
        };
        f.write_str(s)
    }
}

/// A captured artifact, hashed at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub name: String,
    pub hash: String,
    pub size: u64,
}

/// The outcome of one gate run for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateResult {
    pub item: String,
    pub gate: String,
    pub status: GateStatus,
    pub duration_ms: u64,
    /// ISO-8601 start timestamp.
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactRef>,
}

impl GateResult {
    pub fn skipped(item: &str, gate: &str, started_at: String) -> Self {
        Self {
            item: item.to_string(),
            gate: gate.to_string(),
            status: GateStatus::Skip,
            duration_ms: 0,
            started_at,
            stdout_path: None,
            stderr_path: None,
            meta: None,
            artifacts: Vec::new(),
        }
    }

    pub fn meta_reason(&self) -> Option<&str> {
        self.meta.as_ref()?.get("reason")?.as_str()
    }
}

/// Upgrades a legacy gate-result document in place:
/// `result` → `status`, `duration` → `duration_ms`, `start_time` → `started_at`.
/// New-style fields always win when both spellings are present.
pub fn migrate_gate_result(raw: &mut Value) {
    let Some(obj) = raw.as_object_mut() else {
        return;
    };
    for (old, new) in [
        ("result", "status"),
        ("duration", "duration_ms"),
        ("start_time", "started_at"),
    ] {
        if let Some(v) = obj.remove(old) {
            obj.entry(new.to_string()).or_insert(v);
        }
    }
}

/// Parses a gate-result file, accepting both current and legacy field names.
pub fn load_gate_result(text: &str) -> Result<GateResult, DomainError> {
    let mut raw: Value =
        serde_json::from_str(text).map_err(|e| DomainError::InvalidJson(e.to_string()))?;
    migrate_gate_result(&mut raw);
    serde_json::from_value(raw).map_err(|e| DomainError::SchemaValidation {
        issues: vec![crate::domain::error::ValidationIssue {
            path: "$".into(),
            message: e.to_string(),
            code: "gate-result".into(),
        }],
    })
}
