//! Error types for mentord.

use std::time::Duration;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Sandbox infrastructure errors.
///
/// These cover the container runtime being unreachable or misconfigured.
/// A learner program crashing, timing out, or failing its tests is NOT an
/// error: those outcomes are ordinary [`crate::sandbox::ExecutionResult`]s.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Container runtime unavailable: {reason}")]
    RuntimeUnavailable { reason: String },

    #[error("Sandbox image {image} not present")]
    ImageMissing { image: String },

    #[error("Docker API error: {0}")]
    Docker(#[from] bollard::errors::Error),
}

/// LLM provider errors.
///
/// Retries are dispatched on `RateLimited` and `Timeout` only; every other
/// variant is terminal for the request (the firewall then falls back).
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Provider request timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    #[error("Provider request failed: {reason}")]
    Provider { reason: String },

    #[error("Invalid response from provider: {reason}")]
    InvalidResponse { reason: String },

    #[error("Authentication failed for provider")]
    AuthFailed,

    #[error("Provider returned no tool call")]
    MissingToolCall,

    #[error("Unexpected LLM error: {reason}")]
    Unexpected { reason: String },
}

impl LlmError {
    /// Whether a retry may succeed. Only transient provider states qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. } | LlmError::Timeout { .. })
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
