// braid-core/src/infrastructure/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum InfrastructureError {
    // --- FILESYSTEM (IO) ---
    #[error("File System Error: {0}")]
    #[diagnostic(
        code(braid::infra::io),
        help("Check file permissions or path validity.")
    )]
    Io(#[from] std::io::Error),

    // --- CONFIG / YAML ---
    #[error("Invalid config file {path}: {cause}")]
    #[diagnostic(
        code(braid::infra::yaml),
        help("Check your YAML syntax (indentation, types).")
    )]
    InvalidConfig {
        path: String,
        #[source]
        cause: serde_yaml::Error,
    },

    #[error("Configuration Error: {0}")]
    ConfigError(String),

    #[error("Configuration file not found: {0}")]
    #[diagnostic(code(braid::infra::config_missing))]
    ConfigNotFound(String),

    // --- JSON (manifests, gate results) ---
    #[error("JSON Error: {0}")]
    #[diagnostic(code(braid::infra::json))]
    Json(#[from] serde_json::Error),

    // --- GIT SUBPROCESS ---
    #[error("Git Error: `git {args}` exited with {code:?}: {stderr}")]
    #[diagnostic(
        code(braid::infra::git),
        help("Check the repository state (`git status`) and retry.")
    )]
    Git {
        args: String,
        code: Option<i32>,
        stderr: String,
    },

    // --- FORGE (GitHub REST) ---
    #[error("Forge Error: {0}")]
    #[diagnostic(code(braid::infra::forge))]
    Forge(String),

    #[error("HTTP Error: {0}")]
    #[diagnostic(code(braid::infra::http))]
    Http(#[from] reqwest::Error),
}
