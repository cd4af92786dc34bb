//! Error types for the publish client.

use thiserror::Error;

/// Result type alias using the publish error type.
pub type Result<T> = std::result::Result<T, PublishError>;

/// Error type for publish operations.
#[derive(Debug, Error)]
pub enum PublishError {
    /// No token could be resolved.
    #[error("no publish token configured (set PIPESMITH_GITHUB_TOKEN or GITHUB_TOKEN)")]
    MissingToken,

    /// The hosting provider rejected the credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The hosting provider returned an API error.
    #[error("publish API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Network/connectivity error.
    #[error("network error: {0}")]
    Network(String),

    /// The provider's response could not be interpreted.
    #[error("invalid publish response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for PublishError {
    fn from(err: reqwest::Error) -> Self {
        PublishError::Network(err.to_string())
    }
}
