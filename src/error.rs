//! Error types for the lead-EV scoring service.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Authorization error: {0}")]
    Auth(#[from] AuthError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Storage-related errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Provider returned status {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("Invalid response from provider: {reason}")]
    InvalidResponse { reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Authorization errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Unauthorized: {0}")]
    Denied(String),

    #[error("Storage error during authorization: {0}")]
    Storage(#[from] StorageError),
}

/// Errors produced by the scoring pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Scoring failed with code {code}")]
    ScoringFailed { code: i32 },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
