// braid-core/src/infrastructure/git.rs
//
// Subprocess wrapper over the `git` binary. Content conflicts are a
// domain outcome, not an infrastructure failure: merge/rebase helpers
// swallow the non-zero exit when the index reports unmerged paths and let
// the weave operator observe them via `conflicted_paths`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::BraidError;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::vcs::Vcs;

pub struct GitCli {
    repo_dir: PathBuf,
}

impl GitCli {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Whether a git binary is on PATH (doctor check).
    pub async fn available() -> bool {
        Command::new("git")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, BraidError> {
        debug!(args = ?args, "git");
        let out = Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(InfrastructureError::Io)?;
        Ok(out)
    }

    /// Runs git and fails on non-zero exit.
    async fn run_checked(&self, args: &[&str]) -> Result<String, BraidError> {
        let out = self.run(args).await?;
        if !out.status.success() {
            return Err(InfrastructureError::Git {
                args: args.join(" "),
                code: out.status.code(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            }
            .into());
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    /// Runs a merge-family command, tolerating a non-zero exit when it
    /// left conflicts behind for the caller to inspect.
    async fn run_merge(&self, args: &[&str]) -> Result<(), BraidError> {
        let out = self.run(args).await?;
        if out.status.success() {
            return Ok(());
        }
        if !self.unmerged_paths().await?.is_empty() {
            return Ok(());
        }
        Err(InfrastructureError::Git {
            args: args.join(" "),
            code: out.status.code(),
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        }
        .into())
    }

    async fn unmerged_paths(&self) -> Result<Vec<String>, BraidError> {
        let listing = self
            .run_checked(&["diff", "--name-only", "--diff-filter=U"])
            .await?;
        Ok(listing
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }
}

#[async_trait]
impl Vcs for GitCli {
    async fn current_branch(&self) -> Result<String, BraidError> {
        self.run_checked(&["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    async fn is_clean(&self) -> Result<bool, BraidError> {
        let status = self.run_checked(&["status", "--porcelain=v1"]).await?;
        Ok(status.is_empty())
    }

    async fn rev_parse(&self, rev: &str) -> Result<String, BraidError> {
        self.run_checked(&["rev-parse", rev]).await
    }

    async fn create_branch(&self, name: &str, start: &str) -> Result<(), BraidError> {
        self.run_checked(&["branch", name, start]).await?;
        Ok(())
    }

    async fn checkout(&self, rev: &str) -> Result<(), BraidError> {
        self.run_checked(&["checkout", "-q", rev]).await?;
        Ok(())
    }

    async fn merge_no_ff(&self, branch: &str, message: &str) -> Result<(), BraidError> {
        self.run_merge(&["merge", "--no-ff", "-m", message, branch]).await
    }

    async fn merge_squash(&self, branch: &str) -> Result<(), BraidError> {
        self.run_merge(&["merge", "--squash", branch]).await
    }

    async fn merge_ff(&self, branch: &str) -> Result<(), BraidError> {
        self.run_checked(&["merge", "--ff-only", branch]).await?;
        Ok(())
    }

    async fn rebase_onto(&self, branch: &str, onto: &str) -> Result<bool, BraidError> {
        let out = self.run(&["rebase", onto, branch]).await?;
        if out.status.success() {
            return Ok(false);
        }
        let in_progress = self.repo_dir.join(".git/rebase-merge").exists()
            || self.repo_dir.join(".git/rebase-apply").exists();
        if in_progress {
            // Abort so the tree is usable again; the caller records the conflict.
            let _ = self.run(&["rebase", "--abort"]).await;
            return Ok(true);
        }
        Err(InfrastructureError::Git {
            args: format!("rebase {onto} {branch}"),
            code: out.status.code(),
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        }
        .into())
    }

    async fn conflicted_paths(&self) -> Result<Vec<String>, BraidError> {
        self.unmerged_paths().await
    }

    async fn abort_merge(&self) -> Result<(), BraidError> {
        self.run_checked(&["merge", "--abort"]).await?;
        Ok(())
    }

    async fn reset_hard(&self, rev: &str) -> Result<(), BraidError> {
        self.run_checked(&["reset", "--hard", rev]).await?;
        Ok(())
    }

    async fn delete_branch(&self, name: &str) -> Result<(), BraidError> {
        self.run_checked(&["branch", "-D", name]).await?;
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<String, BraidError> {
        self.run_checked(&["commit", "-m", message]).await?;
        self.rev_parse("HEAD").await
    }
}
