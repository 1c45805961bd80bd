// braid-core/src/ports/vcs.rs

use crate::error::BraidError;
use async_trait::async_trait;

/// The merge primitives the weave operator needs from a version-control
/// adapter. Merge operations that hit content conflicts return `Ok` and
/// leave the conflict state observable through [`Vcs::conflicted_paths`];
/// only infrastructure failures are `Err`.
#[async_trait]
pub trait Vcs: Send + Sync {
    async fn current_branch(&self) -> Result<String, BraidError>;

    /// True when the working tree has no uncommitted changes.
    async fn is_clean(&self) -> Result<bool, BraidError>;

    async fn rev_parse(&self, rev: &str) -> Result<String, BraidError>;

    async fn create_branch(&self, name: &str, start: &str) -> Result<(), BraidError>;

    async fn checkout(&self, rev: &str) -> Result<(), BraidError>;

    /// Non-fast-forward merge producing one merge commit.
    async fn merge_no_ff(&self, branch: &str, message: &str) -> Result<(), BraidError>;

    /// Stages a squash merge; the caller commits via [`Vcs::commit`].
    async fn merge_squash(&self, branch: &str) -> Result<(), BraidError>;

    /// Fast-forward-only merge.
    async fn merge_ff(&self, branch: &str) -> Result<(), BraidError>;

    /// Rebases `branch` onto `onto`. On conflict the rebase is aborted and
    /// `Ok(true)` is returned; `Ok(false)` means the rebase completed.
    async fn rebase_onto(&self, branch: &str, onto: &str) -> Result<bool, BraidError>;

    /// Paths currently in the unmerged (conflicted) index state.
    async fn conflicted_paths(&self) -> Result<Vec<String>, BraidError>;

    async fn abort_merge(&self) -> Result<(), BraidError>;

    async fn reset_hard(&self, rev: &str) -> Result<(), BraidError>;

    async fn delete_branch(&self, name: &str) -> Result<(), BraidError>;

    /// Commits staged changes, returning the new commit SHA.
    async fn commit(&self, message: &str) -> Result<String, BraidError>;
}
