//! Configuration for mentord.
//!
//! Everything is environment-driven. A `.env` file is honored when present
//! so local development matches the deployed container.

use std::net::SocketAddr;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Main configuration for the service.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub sandbox: SandboxConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            server: ServerConfig::from_env()?,
            llm: LlmConfig::from_env()?,
            sandbox: SandboxConfig::from_env()?,
        })
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the API server binds to.
    pub bind_addr: SocketAddr,
    /// Origin allowed by CORS (the learning frontend).
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = optional_env("BIND_ADDR")?
            .unwrap_or_else(|| "127.0.0.1:8000".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                key: "BIND_ADDR".to_string(),
                message: format!("must be host:port: {e}"),
            })?;

        Ok(Self {
            bind_addr,
            cors_origin: optional_env("CORS_ORIGIN")?
                .unwrap_or_else(|| "http://localhost:5173".to_string()),
        })
    }
}

/// LLM provider configuration.
///
/// Any OpenAI-compatible chat-completions endpoint works; the default points
/// at Groq's compatibility layer.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API key for the provider. Absent means tutoring endpoints run degraded.
    pub api_key: Option<SecretString>,
    /// Base URL of the provider (the `/chat/completions` path is appended).
    pub base_url: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Retries on rate-limit or timeout before surfacing the failure.
    pub max_retries: u32,
    /// Initial backoff delay between retries, in milliseconds.
    pub retry_initial_delay_ms: u64,
}

impl LlmConfig {
    fn from_env() -> Result<Self, ConfigError> {
        // LLM_API_KEY is canonical; GROQ_API_KEY accepted for compatibility
        // with existing deployments.
        let api_key = optional_env("LLM_API_KEY")?
            .or(optional_env("GROQ_API_KEY")?)
            .map(SecretString::from);

        Ok(Self {
            api_key,
            base_url: optional_env("LLM_BASE_URL")?
                .unwrap_or_else(|| "https://api.groq.com/openai/v1".to_string()),
            model: optional_env("LLM_MODEL")?
                .unwrap_or_else(|| "llama-3.3-70b-versatile".to_string()),
            max_retries: parse_optional_env("LLM_MAX_RETRIES", 2)?,
            retry_initial_delay_ms: parse_optional_env("LLM_RETRY_INITIAL_DELAY_MS", 500)?,
        })
    }
}

/// Docker sandbox configuration.
///
/// Limits are calibrated for short novice exercises: a correct solution
/// finishes in well under a second, so 5 seconds of wall clock and 128 MiB
/// are generous while still containing runaway programs.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Docker image learner code runs in.
    pub image: String,
    /// Memory cap in bytes.
    pub memory_limit_bytes: i64,
    /// CPU quota in microseconds per 100ms scheduling period (50000 = half a core).
    pub cpu_quota: i64,
    /// Wall-clock timeout for one execution, in seconds.
    pub timeout_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: "python:3.10-alpine".to_string(),
            memory_limit_bytes: 128 * 1024 * 1024,
            cpu_quota: 50_000,
            timeout_secs: 5,
        }
    }
}

impl SandboxConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            image: optional_env("SANDBOX_IMAGE")?.unwrap_or(defaults.image),
            memory_limit_bytes: parse_optional_env::<i64>("SANDBOX_MEMORY_LIMIT_MB", 128)?
                * 1024
                * 1024,
            cpu_quota: parse_optional_env("SANDBOX_CPU_QUOTA", defaults.cpu_quota)?,
            timeout_secs: parse_optional_env("SANDBOX_TIMEOUT_SECS", defaults.timeout_secs)?,
        })
    }
}

// Helper functions

pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(val) if val.is_empty() => Ok(None),
        Ok(val) => Ok(Some(val)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::ParseError(format!(
            "failed to read {key}: {e}"
        ))),
    }
}

pub(crate) fn parse_optional_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|s| {
            s.parse().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{e}"),
            })
        })
        .transpose()
        .map(|opt| opt.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global, so serialize tests that mutate them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn optional_env_missing_and_empty() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe { std::env::remove_var("MENTORD_TEST_MISSING") };
        assert_eq!(optional_env("MENTORD_TEST_MISSING").unwrap(), None);

        unsafe { std::env::set_var("MENTORD_TEST_EMPTY", "") };
        assert_eq!(optional_env("MENTORD_TEST_EMPTY").unwrap(), None);
        unsafe { std::env::remove_var("MENTORD_TEST_EMPTY") };
    }

    #[test]
    fn parse_optional_env_default_and_value() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe { std::env::remove_var("MENTORD_TEST_NUM") };
        assert_eq!(parse_optional_env("MENTORD_TEST_NUM", 7u64).unwrap(), 7);

        unsafe { std::env::set_var("MENTORD_TEST_NUM", "42") };
        assert_eq!(parse_optional_env("MENTORD_TEST_NUM", 7u64).unwrap(), 42);
        unsafe { std::env::remove_var("MENTORD_TEST_NUM") };
    }

    #[test]
    fn parse_optional_env_rejects_garbage() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe { std::env::set_var("MENTORD_TEST_BAD", "not-a-number") };
        let err = parse_optional_env("MENTORD_TEST_BAD", 1u64).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        unsafe { std::env::remove_var("MENTORD_TEST_BAD") };
    }

    #[test]
    fn sandbox_defaults() {
        let cfg = SandboxConfig::default();
        assert_eq!(cfg.image, "python:3.10-alpine");
        assert_eq!(cfg.memory_limit_bytes, 128 * 1024 * 1024);
        assert_eq!(cfg.cpu_quota, 50_000);
        assert_eq!(cfg.timeout_secs, 5);
    }
}
