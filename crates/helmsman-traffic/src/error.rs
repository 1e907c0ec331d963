//! Traffic controller error types.

use thiserror::Error;

/// Errors raised while reading or writing traffic weights.
#[derive(Debug, Error)]
pub enum TrafficError {
    #[error("no domain configured for route {route}")]
    DomainNotFound { route: String },

    #[error("invalid weight identifier {0:?}")]
    InvalidWeightKey(String),

    #[error("weight {weight} for {identifier} on {route} is outside 0-100")]
    WeightOutOfRange {
        route: String,
        identifier: String,
        weight: u8,
    },

    /// The DNS collaborator failed; safe to retry the whole operation.
    #[error("dns {action} failed for {identifier} on {route}: {source}")]
    Dns {
        action: &'static str,
        route: String,
        identifier: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type TrafficResult<T> = Result<T, TrafficError>;

