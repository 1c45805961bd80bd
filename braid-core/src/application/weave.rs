// braid-core/src/application/weave.rs
//
// Merges plan items into a single integration branch in dependency order.
// Strategy primitives are delegated to the Vcs port; the semantics here
// are conflict detection, level ordering and rollback bookkeeping.

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use crate::domain::plan::{Plan, PlanItem, WeaveStrategy};
use crate::error::BraidError;
use crate::infrastructure::env::Env;
use crate::ports::vcs::Vcs;

/// Outcome of one strategy application.
#[derive(Debug, Clone, Serialize)]
pub struct WeaveResult {
    pub item: String,
    pub strategy: WeaveStrategy,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
    pub message: String,
    /// Integration-branch tip before this operation; resetting to it
    /// undoes the operation.
    pub rollback_tip: String,
}

/// Outcome of a whole weave run.
#[derive(Debug, Clone, Serialize)]
pub struct WeaveOutcome {
    pub branch: String,
    pub target: String,
    pub operations: Vec<WeaveResult>,
    pub success: bool,
    pub dry_run: bool,
}

impl WeaveOutcome {
    /// Human summary of every failed operation.
    pub fn failure_summary(&self) -> String {
        self.operations
            .iter()
            .filter(|op| !op.success)
            .map(|op| format!("{} ({}): {}", op.item, op.strategy, op.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// `<branchPrefix><compact-iso-timestamp>-<8hex>`, where the hex suffix is
/// the leading eight characters of SHA-256 over the target and the item
/// names in plan order.
pub fn integration_branch_name(env: &Env, target: &str, items: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(target.as_bytes());
    for name in items {
        hasher.update(b"\n");
        hasher.update(name.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    format!(
        "{}{}-{}",
        env.branch_prefix,
        env.timestamp_compact(),
        &digest[..8]
    )
}

pub struct WeaveOperator<'a> {
    pub vcs: &'a dyn Vcs,
    pub env: &'a Env,
    pub dry_run: bool,
}

impl<'a> WeaveOperator<'a> {
    pub fn new(vcs: &'a dyn Vcs, env: &'a Env, dry_run: bool) -> Self {
        Self { vcs, env, dry_run }
    }

    /// Creates the integration branch off the target and weaves level by
    /// level. The first conflicted operation stops the current level and
    /// every later level; the partial branch is preserved for inspection.
    #[instrument(skip_all, fields(target = %plan.target, dry_run = self.dry_run))]
    pub async fn weave(
        &self,
        plan: &Plan,
        levels: &[Vec<String>],
    ) -> Result<WeaveOutcome, BraidError> {
        let names: Vec<String> = levels.iter().flatten().cloned().collect();
        let branch = integration_branch_name(self.env, &plan.target, &names);

        let mut outcome = WeaveOutcome {
            branch: branch.clone(),
            target: plan.target.clone(),
            operations: Vec::new(),
            success: true,
            dry_run: self.dry_run,
        };

        if !self.dry_run {
            self.vcs.create_branch(&branch, &plan.target).await?;
            self.vcs.checkout(&branch).await?;
        }
        info!(branch = %branch, "integration branch ready");

        'levels: for level in levels {
            for name in level {
                let item = plan.require_item(name)?;
                let op = self.apply(item, &branch).await?;
                let failed = !op.success;
                outcome.operations.push(op);
                if failed {
                    outcome.success = false;
                    break 'levels;
                }
            }
        }

        Ok(outcome)
    }

    async fn apply(&self, item: &PlanItem, branch: &str) -> Result<WeaveResult, BraidError> {
        let strategy = item.strategy();
        let source = item.source_branch();

        if self.dry_run {
            return Ok(WeaveResult {
                item: item.name.clone(),
                strategy,
                success: true,
                commit: None,
                conflicts: Vec::new(),
                message: format!("dry-run: would {strategy} '{source}'"),
                rollback_tip: "dry-run".to_string(),
            });
        }

        let rollback_tip = self.vcs.rev_parse("HEAD").await?;
        let mut result = WeaveResult {
            item: item.name.clone(),
            strategy,
            success: true,
            commit: None,
            conflicts: Vec::new(),
            message: String::new(),
            rollback_tip,
        };

        match strategy {
            WeaveStrategy::MergeWeave => {
                self.vcs
                    .merge_no_ff(source, &format!("weave: merge {}", item.name))
                    .await?;
                let conflicts = self.vcs.conflicted_paths().await?;
                if conflicts.is_empty() {
                    result.commit = Some(self.vcs.rev_parse("HEAD").await?);
                    result.message = format!("merged '{source}'");
                } else {
                    self.vcs.abort_merge().await?;
                    result.success = false;
                    result.message = format!("merge of '{source}' conflicted");
                    result.conflicts = conflicts;
                }
            }
            WeaveStrategy::SquashWeave => {
                self.vcs.merge_squash(source).await?;
                let conflicts = self.vcs.conflicted_paths().await?;
                if conflicts.is_empty() {
                    let commit = self
                        .vcs
                        .commit(&format!("weave: squash {} ({source})", item.name))
                        .await?;
                    result.commit = Some(commit);
                    result.message = format!("squashed '{source}'");
                } else {
                    self.vcs.reset_hard(&result.rollback_tip).await?;
                    result.success = false;
                    result.message = format!("squash of '{source}' conflicted");
                    result.conflicts = conflicts;
                }
            }
            WeaveStrategy::RebaseWeave => {
                let conflicted = self.vcs.rebase_onto(source, branch).await?;
                if conflicted {
                    // rebase_onto already aborted; the tree is usable
                    self.vcs.checkout(branch).await?;
                    result.success = false;
                    result.message = format!("rebase of '{source}' conflicted");
                } else {
                    self.vcs.checkout(branch).await?;
                    self.vcs.merge_ff(source).await?;
                    result.commit = Some(self.vcs.rev_parse("HEAD").await?);
                    result.message = format!("rebased and fast-forwarded '{source}'");
                }
            }
        }

        Ok(result)
    }

    /// Restores an operation's pre-op tip, discarding it and everything
    /// after it on the integration branch.
    pub async fn rollback(&self, op: &WeaveResult) -> Result<(), BraidError> {
        if self.dry_run || op.rollback_tip == "dry-run" {
            return Ok(());
        }
        self.vcs.reset_hard(&op.rollback_tip).await
    }
}
