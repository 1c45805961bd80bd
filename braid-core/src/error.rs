// braid-core/src/error.rs

use crate::domain::error::DomainError;
use crate::infrastructure::error::InfrastructureError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum BraidError {
    // --- DOMAIN ERRORS (Validation, Cycles, Write-protection) ---
    #[error(transparent)]
    #[diagnostic(transparent)]
    Domain(#[from] DomainError),

    // --- INFRASTRUCTURE ERRORS (IO, Git, Forge, Parsing) ---
    #[error(transparent)]
    #[diagnostic(transparent)]
    Infrastructure(#[from] InfrastructureError),

    // --- GATE OUTCOME (required gates failed; results are persisted) ---
    #[error("Gate failure: {0}")]
    GateFailure(String),

    // --- GENERIC / APPLICATIVE ERRORS ---
    #[error("Internal Error: {0}")]
    InternalError(String),

    #[error("Unsafe path traversal detected: {0}")]
    UnsafePath(String),
}

// Manual implementation to avoid duplicate enum variant but keep ergonomics
impl From<std::io::Error> for BraidError {
    fn from(err: std::io::Error) -> Self {
        BraidError::Infrastructure(InfrastructureError::Io(err))
    }
}

impl BraidError {
    /// CLI exit code for this error: 2 for user-input validation and
    /// write-protection, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            BraidError::Domain(_) => 2,
            _ => 1,
        }
    }
}
