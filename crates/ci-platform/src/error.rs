//! Error types for ci-platform

use thiserror::Error;

/// Errors that can occur while talking to the CI platform
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CiError {
    /// Client misconfiguration (missing token, bad base URL)
    #[error("CI platform is not configured: {0}")]
    Config(String),

    /// Transport-level failure (DNS, TLS, connection reset)
    #[error("HTTP error: {0}")]
    Http(String),

    /// The API answered with a non-success status
    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    /// A named object (team, repository) does not exist or is not visible
    #[error("not found: {0}")]
    NotFound(String),

    /// The API answered successfully with a body we could not read
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for CiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CiError::Decode(err.to_string())
        } else {
            CiError::Http(err.to_string())
        }
    }
}
