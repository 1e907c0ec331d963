//! Error types for the Helmsman state store.

use thiserror::Error;

use crate::phase::DeploymentPhase;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Someone committed between our read and our write.
    #[error(
        "version conflict on {key}: expected {}, found {}",
        fmt_version(.expected),
        fmt_version(.found)
    )]
    VersionConflict {
        key: String,
        expected: Option<u64>,
        found: Option<u64>,
    },

    #[error("illegal phase transition {from:?} -> {to:?}")]
    IllegalTransition {
        from: DeploymentPhase,
        to: DeploymentPhase,
    },
}

fn fmt_version(v: &Option<u64>) -> String {
    match v {
        Some(v) => format!("v{v}"),
        None => "no record".to_string(),
    }
}
