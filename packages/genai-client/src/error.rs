//! Error types for the text generation clients.

use thiserror::Error;

/// Result type for generation client operations.
pub type Result<T> = std::result::Result<T, GenAiError>;

/// Generation client errors.
#[derive(Debug, Error)]
pub enum GenAiError {
    /// Configuration error (missing API key, empty prompt)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network error (connection failed, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// API error (non-2xx response, safety block)
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Parse error (invalid JSON, no candidates)
    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for GenAiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GenAiError::Parse(err.to_string())
        } else {
            GenAiError::Network(err.to_string())
        }
    }
}
