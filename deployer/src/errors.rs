//! Error types for the deployer

use std::time::Duration;

use thiserror::Error;

/// Main error type for the deployer
#[derive(Error, Debug)]
pub enum DeployerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Swarm error: {0}")]
    SwarmError(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),

    #[error("Template error: {0}")]
    TemplateError(String),

    #[error("Certificate error: {0}")]
    CertificateError(String),

    #[error("Management API error: {0}")]
    ApiError(String),

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Credential error: {0}")]
    CredentialError(String),

    #[error("Timed out waiting for service '{service}' to start after {timeout:?}")]
    Timeout { service: String, timeout: Duration },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeployerError {
    /// Whether this error is a convergence timeout. Timeouts end the run but
    /// the whole sequence is safe to re-execute thanks to idempotent
    /// provisioning.
    pub fn is_timeout(&self) -> bool {
        matches!(self, DeployerError::Timeout { .. })
    }
}

impl From<anyhow::Error> for DeployerError {
    fn from(err: anyhow::Error) -> Self {
        DeployerError::Internal(err.to_string())
    }
}

impl From<tera::Error> for DeployerError {
    fn from(err: tera::Error) -> Self {
        DeployerError::TemplateError(err.to_string())
    }
}
