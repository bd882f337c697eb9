//! Operator decisions
//!
//! The one interactive moment of the sequence (swarm-init confirmation,
//! plus the advertise-address fallback) goes through this trait so
//! non-interactive runs can pre-answer it.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::errors::DeployerError;

/// A source of operator decisions
#[async_trait]
pub trait OperatorPrompt: Send + Sync {
    /// Yes/no question; an empty interactive answer means yes
    async fn confirm(&self, question: &str) -> Result<bool, DeployerError>;

    /// Free-form question
    async fn ask(&self, question: &str) -> Result<String, DeployerError>;
}

/// Interactive prompt on stdin/stdout
#[derive(Debug, Clone, Default)]
pub struct StdinPrompt;

impl StdinPrompt {
    pub fn new() -> Self {
        Self
    }

    async fn read_line(&self, question: &str) -> Result<String, DeployerError> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(question.as_bytes()).await?;
        stdout.write_all(b" ").await?;
        stdout.flush().await?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        Ok(line.trim().to_string())
    }
}

#[async_trait]
impl OperatorPrompt for StdinPrompt {
    async fn confirm(&self, question: &str) -> Result<bool, DeployerError> {
        let answer = self.read_line(&format!("{} (Y/n):", question)).await?;
        Ok(answer.is_empty() || answer.eq_ignore_ascii_case("y"))
    }

    async fn ask(&self, question: &str) -> Result<String, DeployerError> {
        self.read_line(&format!("{}:", question)).await
    }
}

/// Pre-answered prompt for non-interactive runs and tests
#[derive(Debug, Clone, Default)]
pub struct Preanswered {
    pub confirm: bool,
    pub answer: Option<String>,
}

impl Preanswered {
    pub fn assume_yes() -> Self {
        Self {
            confirm: true,
            answer: None,
        }
    }
}

#[async_trait]
impl OperatorPrompt for Preanswered {
    async fn confirm(&self, _question: &str) -> Result<bool, DeployerError> {
        Ok(self.confirm)
    }

    async fn ask(&self, question: &str) -> Result<String, DeployerError> {
        self.answer.clone().ok_or_else(|| {
            DeployerError::ConfigError(format!("no pre-answered response for: {}", question))
        })
    }
}
