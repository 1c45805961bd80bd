// braid-core/src/domain/plan/mod.rs

pub mod canonical;
pub mod validate;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

pub use canonical::{canonical_json, plan_hash};
pub use validate::{load_plan, validate_plan};

/// Schema version line accepted by this runner.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// The root record: a validated set of items + dependencies + policy
/// defining one integration attempt against `target`.
///
/// Equality is defined on the canonical serialization; two plans with the
/// same canonical bytes are the same plan (see [`canonical_json`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Plan {
    pub schema_version: String,
    pub target: String,
    #[serde(default)]
    pub items: Vec<PlanItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<Policy>,
}

impl Plan {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            target: target.into(),
            items: Vec::new(),
            policy: None,
        }
    }

    pub fn item(&self, name: &str) -> Option<&PlanItem> {
        self.items.iter().find(|i| i.name == name)
    }

    pub fn require_item(&self, name: &str) -> Result<&PlanItem, DomainError> {
        self.item(name)
            .ok_or_else(|| DomainError::ItemNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.items.iter().map(|i| i.name.clone()).collect()
    }

    /// The policy in force: the declared one, or the documented default
    /// (empty required set, one worker).
    pub fn effective_policy(&self) -> Policy {
        self.policy.clone().unwrap_or_default()
    }
}

/// One change-request unit (typically one PR) with a unique name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlanItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gates: Vec<Gate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<WeaveStrategy>,
}

impl PlanItem {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            deps: Vec::new(),
            gates: Vec::new(),
            branch: None,
            sha: None,
            strategy: None,
        }
    }

    /// The weave strategy in force (absent = rebase-weave).
    pub fn strategy(&self) -> WeaveStrategy {
        self.strategy.unwrap_or_default()
    }

    /// The branch to integrate: explicit `branch` or the item name itself.
    pub fn source_branch(&self) -> &str {
        self.branch.as_deref().unwrap_or(&self.name)
    }
}

/// An external check (command + timeout) whose pass/fail determines
/// eligibility.
///
/// `runtime` is retained metadata: only `local` is executable by this
/// runner, anything else fails the gate at execution time with a
/// structured message. See `application::gates`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Gate {
    pub name: String,
    pub run: String,
    #[serde(default)]
    pub runtime: GateRuntime,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,
    #[serde(default)]
    pub retries: u32,
}

fn default_timeout_sec() -> u64 {
    300
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateRuntime {
    #[default]
    Local,
    Container,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeaveStrategy {
    #[default]
    RebaseWeave,
    MergeWeave,
    SquashWeave,
}

impl std::fmt::Display for WeaveStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WeaveStrategy::RebaseWeave => "rebase-weave",
            WeaveStrategy::MergeWeave => "merge-weave",
            WeaveStrategy::SquashWeave => "squash-weave",
        };
        f.write_str(s)
    }
}

/// Plan-wide gate and merge policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Policy {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_gates: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optional_gates: Vec<String>,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub retries: BTreeMap<String, u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<GateOverrides>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub block_on: Vec<String>,
    #[serde(default)]
    pub merge_rule: MergeRule,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            required_gates: Vec::new(),
            optional_gates: Vec::new(),
            max_workers: default_max_workers(),
            retries: BTreeMap::new(),
            overrides: None,
            block_on: Vec::new(),
            merge_rule: MergeRule::default(),
        }
    }
}

fn default_max_workers() -> usize {
    1
}

impl Policy {
    /// Whether a gate counts towards item eligibility.
    ///
    /// An empty `requiredGates` list means every gate is required except
    /// those listed in `optionalGates`; a non-empty list is exhaustive.
    /// `overrides.required` force-requires a gate in either mode.
    pub fn is_required(&self, gate: &str) -> bool {
        if let Some(overrides) = &self.overrides {
            if overrides.required.iter().any(|g| g == gate) {
                return true;
            }
        }
        if self.required_gates.is_empty() {
            !self.optional_gates.iter().any(|g| g == gate)
        } else {
            self.required_gates.iter().any(|g| g == gate)
        }
    }

    /// Whether policy overrides exclude a gate from execution.
    pub fn is_skipped(&self, gate: &str) -> bool {
        self.overrides
            .as_ref()
            .map(|o| o.skip.iter().any(|g| g == gate))
            .unwrap_or(false)
    }

    /// Retry budget for a gate: the per-name policy override wins over the
    /// gate's own declaration.
    pub fn retries_for(&self, gate: &Gate) -> u32 {
        self.retries.get(&gate.name).copied().unwrap_or(gate.retries)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GateOverrides {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeRule {
    #[default]
    StrictRequired,
}
