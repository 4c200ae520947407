use rusqlite;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MagistrateError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Policy denied by {rule}: {reason}")]
    PolicyDenied { rule: String, reason: String },
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),
    #[error("Path safety violation: {0}")]
    PathSafety(String),
    #[error("Deploy failure: {0}")]
    DeployFailure(String),
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),
    #[error("Proposer failure: {0}")]
    ProposerFailure(String),
    #[error("Git error: {0}")]
    GitError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl MagistrateError {
    /// Stable machine-readable code carried into audit evidence.
    pub fn code(&self) -> &'static str {
        match self {
            MagistrateError::RusqliteError(_) => "STORE_ERROR",
            MagistrateError::IoError(_) => "IO_ERROR",
            MagistrateError::JsonError(_) => "JSON_ERROR",
            MagistrateError::PolicyDenied { .. } => "POLICY_DENIED",
            MagistrateError::IntegrityViolation(_) => "INTEGRITY_VIOLATION",
            MagistrateError::PathSafety(_) => "PATH_SAFETY",
            MagistrateError::DeployFailure(_) => "DEPLOY_FAILURE",
            MagistrateError::ConfigurationMissing(_) => "CONFIGURATION_MISSING",
            MagistrateError::ProposerFailure(_) => "PROPOSER_FAILURE",
            MagistrateError::GitError(_) => "GIT_ERROR",
            MagistrateError::ValidationError(_) => "VALIDATION_ERROR",
        }
    }
}
