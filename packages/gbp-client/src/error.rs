//! Error types for the Business Profile client.

use thiserror::Error;

/// Result type for Business Profile client operations.
pub type Result<T> = std::result::Result<T, GbpError>;

/// Business Profile client errors.
#[derive(Debug, Error)]
pub enum GbpError {
    /// Configuration error (missing client id, empty token)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network error (connection failed, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// API error (non-2xx response)
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Parse error (invalid JSON, unexpected response format)
    #[error("Parse error: {0}")]
    Parse(String),
}

impl GbpError {
    /// HTTP status carried by an API error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            GbpError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether retrying the same request later could succeed.
    ///
    /// Rate limits, server errors and network failures are transient;
    /// client errors (bad request, auth, missing resource) are not.
    pub fn is_transient(&self) -> bool {
        match self {
            GbpError::Network(_) => true,
            GbpError::Api { status, .. } => *status == 429 || *status >= 500,
            GbpError::Config(_) | GbpError::Parse(_) => false,
        }
    }
}

impl From<reqwest::Error> for GbpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GbpError::Parse(err.to_string())
        } else {
            GbpError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_rate_limits_are_transient() {
        let throttled = GbpError::Api {
            status: 429,
            message: "quota".into(),
        };
        let unavailable = GbpError::Api {
            status: 503,
            message: "backend".into(),
        };
        assert!(throttled.is_transient());
        assert!(unavailable.is_transient());
        assert!(GbpError::Network("reset".into()).is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        for status in [400, 401, 403, 404] {
            let err = GbpError::Api {
                status,
                message: String::new(),
            };
            assert!(!err.is_transient(), "status {status} should be permanent");
        }
        assert!(!GbpError::Parse("bad json".into()).is_transient());
    }
}
