// braid-core/src/ports/forge.rs

// What the core needs from a hosted forge, without knowing which one.
// The application layer plans annotations and merges against this trait;
// the GitHub adapter (and the test mocks) supply the electricity.

use crate::error::BraidError;
use async_trait::async_trait;

/// A change request as seen by the planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    /// Head branch name.
    pub branch: String,
    /// Head commit SHA.
    pub sha: String,
    pub body: String,
    pub labels: Vec<String>,
}

#[async_trait]
pub trait Forge: Send + Sync {
    /// Runs a forge search query and resolves each hit to a full PR.
    async fn search_open_prs(&self, query: &str) -> Result<Vec<PullRequest>, BraidError>;

    /// Posts a status comment on a PR.
    async fn comment(&self, number: u64, body: &str) -> Result<(), BraidError>;

    /// Opens a PR from `head` into `base`, returning its number.
    async fn open_pull_request(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<u64, BraidError>;

    /// Closes a PR without merging.
    async fn close_pull_request(&self, number: u64) -> Result<(), BraidError>;

    /// Merges a PR through the forge.
    async fn merge_pull_request(&self, number: u64) -> Result<(), BraidError>;
}
