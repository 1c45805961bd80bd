// braid-core/src/infrastructure/env.rs
//
// Every process-wide environment read funnels through one `Env` value
// captured at startup and passed explicitly. Tests construct their own
// instead of mutating the process environment.

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

pub const PROFILE_DIR_VAR: &str = "LEX_PR_PROFILE_DIR";
pub const BRANCH_PREFIX_VAR: &str = "LEX_BRANCH_PREFIX";
pub const ALLOW_MUTATIONS_VAR: &str = "ALLOW_MUTATIONS";
pub const DETERMINISTIC_TIME_VAR: &str = "LEX_PR_DETERMINISTIC_TIME";
pub const GITHUB_TOKEN_VAR: &str = "GITHUB_TOKEN";

const DEFAULT_BRANCH_PREFIX: &str = "integration/";

#[derive(Debug, Clone)]
pub struct Env {
    /// Explicit profile root override.
    pub profile_dir: Option<PathBuf>,
    /// Prefix for integration branches (default `integration/`).
    pub branch_prefix: String,
    /// Gate for any side-effecting adapter call. Only the literal string
    /// "true" enables mutations; anything else is false.
    pub allow_mutations: bool,
    /// Pinned wall clock for reproducible outputs.
    pub deterministic_time: Option<DateTime<Utc>>,
    /// Forge authentication.
    pub github_token: Option<String>,
}

impl Env {
    /// Captures the process environment once.
    pub fn capture() -> Self {
        let deterministic_time = std::env::var(DETERMINISTIC_TIME_VAR)
            .ok()
            .and_then(|raw| match DateTime::parse_from_rfc3339(&raw) {
                Ok(t) => Some(t.with_timezone(&Utc)),
                Err(e) => {
                    warn!(value = %raw, error = %e, "ignoring unparsable {DETERMINISTIC_TIME_VAR}");
                    None
                }
            });

        Self {
            profile_dir: std::env::var_os(PROFILE_DIR_VAR).map(PathBuf::from),
            branch_prefix: std::env::var(BRANCH_PREFIX_VAR)
                .unwrap_or_else(|_| DEFAULT_BRANCH_PREFIX.to_string()),
            allow_mutations: std::env::var(ALLOW_MUTATIONS_VAR).as_deref() == Ok("true"),
            deterministic_time,
            github_token: std::env::var(GITHUB_TOKEN_VAR).ok(),
        }
    }

    /// An Env with defaults and no overrides, for tests.
    pub fn bare() -> Self {
        Self {
            profile_dir: None,
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
            allow_mutations: false,
            deterministic_time: None,
            github_token: None,
        }
    }

    /// Current wall clock, honoring the deterministic override.
    pub fn now(&self) -> DateTime<Utc> {
        self.deterministic_time.unwrap_or_else(Utc::now)
    }

    /// ISO-8601 timestamp for record fields.
    pub fn timestamp_iso(&self) -> String {
        self.now().to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Compact timestamp safe for directory and branch names.
    pub fn timestamp_compact(&self) -> String {
        self.now().format("%Y%m%dT%H%M%SZ").to_string()
    }
}
