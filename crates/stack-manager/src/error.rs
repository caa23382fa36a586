//! Error types for stack-manager

use thiserror::Error;

/// Errors reported by a stack manager backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StackError {
    /// The template or request failed the manager's validation
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// A stack or named resource with this identity already exists
    #[error("already exists: {message}")]
    AlreadyExists { message: String },

    /// The template creates IAM resources without the matching capability
    #[error("insufficient capabilities: {message}")]
    InsufficientCapabilities { message: String },

    /// Caller credentials are not allowed to perform the operation
    #[error("access denied: {message}")]
    AccessDenied { message: String },

    /// An account or service quota was hit
    #[error("limit exceeded: {message}")]
    LimitExceeded { message: String },

    /// Any other service-side error code
    #[error("service error ({code}): {message}")]
    Service { code: String, message: String },

    /// Network, credential resolution or timeout failure before a response
    #[error("transport error: {0}")]
    Transport(String),
}

impl StackError {
    /// Whether the manager refused the request itself (bad template, name
    /// collision, missing capability) as opposed to failing while trying.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            StackError::Validation { .. }
                | StackError::AlreadyExists { .. }
                | StackError::InsufficientCapabilities { .. }
        )
    }
}
