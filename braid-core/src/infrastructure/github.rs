// braid-core/src/infrastructure/github.rs
//
// GitHub REST adapter behind the Forge port. Read calls work with or
// without a token; every mutating call is gated twice — the autopilot's
// dry-run turns it into a recorded intent before it gets here, and
// ALLOW_MUTATIONS is the last line of defense at the adapter itself.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::error::BraidError;
use crate::infrastructure::env::Env;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::forge::{Forge, PullRequest};

const DEFAULT_API_BASE: &str = "https://api.github.com";

pub struct GithubClient {
    http: reqwest::Client,
    base: String,
    /// `owner/repo` slug.
    repo: String,
    allow_mutations: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    head: PullHead,
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct PullHead {
    #[serde(rename = "ref")]
    branch: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct Label {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CreatedPull {
    number: u64,
}

impl GithubClient {
    pub fn new(env: &Env, repo: &str) -> Result<Self, BraidError> {
        Self::with_base(env, repo, DEFAULT_API_BASE)
    }

    /// Custom API base, used by tests against a local stub.
    pub fn with_base(env: &Env, repo: &str, base: &str) -> Result<Self, BraidError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("braid"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        if let Some(token) = &env.github_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| InfrastructureError::Forge("invalid GITHUB_TOKEN".into()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(InfrastructureError::Http)?;

        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            repo: repo.to_string(),
            allow_mutations: env.allow_mutations,
        })
    }

    fn ensure_mutations_allowed(&self, action: &str) -> Result<(), BraidError> {
        if self.allow_mutations {
            Ok(())
        } else {
            Err(InfrastructureError::Forge(format!(
                "refusing to {action}: mutations are disabled (set ALLOW_MUTATIONS=true)"
            ))
            .into())
        }
    }

    async fn get_pull(&self, number: u64) -> Result<PullRequest, BraidError> {
        let url = format!("{}/repos/{}/pulls/{number}", self.base, self.repo);
        let pull: PullResponse = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(InfrastructureError::Http)?
            .error_for_status()
            .map_err(InfrastructureError::Http)?
            .json()
            .await
            .map_err(InfrastructureError::Http)?;

        Ok(PullRequest {
            number: pull.number,
            title: pull.title,
            branch: pull.head.branch,
            sha: pull.head.sha,
            body: pull.body.unwrap_or_default(),
            labels: pull.labels.into_iter().map(|l| l.name).collect(),
        })
    }
}

#[async_trait]
impl Forge for GithubClient {
    #[instrument(skip(self))]
    async fn search_open_prs(&self, query: &str) -> Result<Vec<PullRequest>, BraidError> {
        let q = format!("repo:{} is:pr is:open {query}", self.repo);
        let url = format!("{}/search/issues", self.base);
        let found: SearchResponse = self
            .http
            .get(&url)
            .query(&[("q", q.as_str()), ("per_page", "100")])
            .send()
            .await
            .map_err(InfrastructureError::Http)?
            .error_for_status()
            .map_err(InfrastructureError::Http)?
            .json()
            .await
            .map_err(InfrastructureError::Http)?;

        debug!(hits = found.items.len(), "forge search");

        let mut pulls = Vec::with_capacity(found.items.len());
        for hit in found.items {
            pulls.push(self.get_pull(hit.number).await?);
        }
        Ok(pulls)
    }

    async fn comment(&self, number: u64, body: &str) -> Result<(), BraidError> {
        self.ensure_mutations_allowed("comment")?;
        let url = format!("{}/repos/{}/issues/{number}/comments", self.base, self.repo);
        self.http
            .post(&url)
            .json(&json!({ "body": body }))
            .send()
            .await
            .map_err(InfrastructureError::Http)?
            .error_for_status()
            .map_err(InfrastructureError::Http)?;
        Ok(())
    }

    async fn open_pull_request(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<u64, BraidError> {
        self.ensure_mutations_allowed("open a pull request")?;
        let url = format!("{}/repos/{}/pulls", self.base, self.repo);
        let created: CreatedPull = self
            .http
            .post(&url)
            .json(&json!({ "head": head, "base": base, "title": title, "body": body }))
            .send()
            .await
            .map_err(InfrastructureError::Http)?
            .error_for_status()
            .map_err(InfrastructureError::Http)?
            .json()
            .await
            .map_err(InfrastructureError::Http)?;
        Ok(created.number)
    }

    async fn close_pull_request(&self, number: u64) -> Result<(), BraidError> {
        self.ensure_mutations_allowed("close a pull request")?;
        let url = format!("{}/repos/{}/pulls/{number}", self.base, self.repo);
        self.http
            .patch(&url)
            .json(&json!({ "state": "closed" }))
            .send()
            .await
            .map_err(InfrastructureError::Http)?
            .error_for_status()
            .map_err(InfrastructureError::Http)?;
        Ok(())
    }

    async fn merge_pull_request(&self, number: u64) -> Result<(), BraidError> {
        self.ensure_mutations_allowed("merge a pull request")?;
        let url = format!("{}/repos/{}/pulls/{number}/merge", self.base, self.repo);
        self.http
            .put(&url)
            .json(&json!({}))
            .send()
            .await
            .map_err(InfrastructureError::Http)?
            .error_for_status()
            .map_err(InfrastructureError::Http)?;
        Ok(())
    }
}
