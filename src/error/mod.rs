//! Error types for lmbridge.

use thiserror::Error;

/// Primary error type for all lmbridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid server URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Structured output failed after {attempts} attempt(s): {message}")]
    StructuredOutput { attempts: u32, message: String },

    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),
}

impl BridgeError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether the model's answer was the problem, so asking again may help.
    pub fn is_reaskable(&self) -> bool {
        matches!(
            self,
            Self::StructuredOutput { .. } | Self::SchemaValidation(_)
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, BridgeError>;
