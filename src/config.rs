//! Service configuration, read from the environment at startup.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default model for both the scoring and flag calls.
pub const DEFAULT_MODEL: &str = "meta-llama/Llama-4-Maverick-17B-128E-Instruct-FP8";

/// Default chat-completions endpoint.
pub const DEFAULT_API_URL: &str = "https://api.together.xyz/v1/chat/completions";

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// API key for the LLM provider.
    pub api_key: SecretString,
    /// Model identifier sent with every completion request.
    pub model: String,
    /// Chat-completions endpoint URL.
    pub api_url: String,
    /// Path to the local database file.
    pub db_path: String,
    /// HTTP listen port.
    pub port: u16,
    /// Session token that skips authorization (internal callers).
    pub bypass_token: Option<String>,
    /// Per-request timeout for LLM calls. Keeps a hung provider from
    /// blocking the caller indefinitely.
    pub llm_timeout: Duration,
    /// If set, rate-limit checks are delegated to this endpoint instead
    /// of the local counter table.
    pub rate_limit_url: Option<String>,
}

impl ServiceConfig {
    /// Build configuration from `LEADSCORE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("LEADSCORE_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("LEADSCORE_API_KEY".to_string()))?;

        let port = parse_var("LEADSCORE_PORT", 8080u16)?;
        let timeout_secs = parse_var("LEADSCORE_LLM_TIMEOUT_SECS", 8u64)?;

        Ok(Self {
            api_key: SecretString::from(api_key),
            model: std::env::var("LEADSCORE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            api_url: std::env::var("LEADSCORE_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            db_path: std::env::var("LEADSCORE_DB_PATH")
                .unwrap_or_else(|_| "./data/leadscore.db".to_string()),
            port,
            bypass_token: std::env::var("LEADSCORE_BYPASS_TOKEN").ok(),
            llm_timeout: Duration::from_secs(timeout_secs),
            rate_limit_url: std::env::var("LEADSCORE_RATE_LIMIT_URL").ok(),
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("could not parse {raw:?}"),
        }),
    }
}
