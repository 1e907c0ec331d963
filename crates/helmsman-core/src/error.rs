//! Error types for configuration and shared types.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced before any infrastructure mutation is attempted.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read config: {0}")]
    Config(String),

    #[error("invalid config: {0}")]
    Validation(String),

    #[error("no domain configured for route {route}")]
    DomainNotFound { route: String },

    #[error("invalid stack index: {0}")]
    InvalidStackIndex(u8),
}
