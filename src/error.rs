//! Error types for genflow

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for genflow operations
pub type Result<T> = std::result::Result<T, Error>;

/// One failed provider attempt inside a fallback chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptFailure {
    /// Provider name
    pub provider: String,
    /// 1-based position of the provider in the chain
    pub attempt: usize,
    /// Rendered error
    pub error: String,
}

/// Main error type for genflow
#[derive(Debug, Error)]
pub enum Error {
    /// A single provider invocation failed
    #[error("Provider {provider} failed: {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Failure detail
        message: String,
    },

    /// Every provider in a fallback chain failed.
    ///
    /// Only the last error is rendered; `failures` keeps the full trace.
    #[error("Generation failed with all {attempts} providers. Last error: {last_error}")]
    ChainExhausted {
        /// Providers tried
        attempts: usize,
        /// Error of the last provider
        last_error: String,
        /// Every failed attempt, in order
        failures: Vec<AttemptFailure>,
    },

    /// A job failed inside an orchestration run
    #[error("Job {job} failed: {message}")]
    Job {
        /// Job name
        job: String,
        /// Failure detail
        message: String,
    },

    /// Defect in result aggregation; never produced for ordinary job failures
    #[error("Orchestration error: {0}")]
    Orchestration(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a provider error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a job error
    pub fn job(job: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Job {
            job: job.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an other error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Attempt trace carried by a chain exhaustion, empty for every other variant
    pub fn attempt_failures(&self) -> &[AttemptFailure] {
        match self {
            Self::ChainExhausted { failures, .. } => failures,
            _ => &[],
        }
    }
}

impl From<::config::ConfigError> for Error {
    fn from(err: ::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_exhausted_renders_only_last_error() {
        let err = Error::ChainExhausted {
            attempts: 2,
            last_error: "rate limited".into(),
            failures: vec![
                AttemptFailure {
                    provider: "a".into(),
                    attempt: 1,
                    error: "bad gateway".into(),
                },
                AttemptFailure {
                    provider: "b".into(),
                    attempt: 2,
                    error: "rate limited".into(),
                },
            ],
        };

        let rendered = err.to_string();
        assert!(rendered.ends_with("Last error: rate limited"));
        assert!(!rendered.contains("bad gateway"));
        assert_eq!(err.attempt_failures().len(), 2);
    }

    #[test]
    fn struct_variants_render_their_fields() {
        assert_eq!(Error::provider("gemini", "quota").to_string(), "Provider gemini failed: quota");
        assert_eq!(Error::job("titles", "empty").to_string(), "Job titles failed: empty");
    }

    #[test]
    fn other_variants_have_no_trace() {
        assert!(Error::timeout("slow").attempt_failures().is_empty());
    }
}
