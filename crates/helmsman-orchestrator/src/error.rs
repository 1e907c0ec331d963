//! Orchestrator error types.

use helmsman_core::{CoreError, StackIndex};
use helmsman_rollout::{BatchReport, RolloutError};
use helmsman_state::{DeploymentPhase, ResourceHandle, ResourceKind, StateError};
use helmsman_traffic::TrafficError;
use thiserror::Error;

/// How a failure should be handled by whoever runs the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; nothing was mutated. Fix the configuration.
    Configuration,
    /// Version conflict, illegal phase, or a lost resource. Needs an operator.
    Conflict,
    /// Infrastructure hiccup. Re-running the same operation is safe.
    Transient,
    /// A batch run stopped part way; completed batches stay mutated.
    PartialFailure,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Core(#[from] CoreError),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("traffic error: {0}")]
    Traffic(#[from] TrafficError),

    #[error("rollout error: {0}")]
    Rollout(#[from] RolloutError),

    #[error("resource {name} ({handle}) no longer exists")]
    Drift { name: String, handle: ResourceHandle },

    #[error("no resource client registered for {0}")]
    MissingResourceClient(ResourceKind),

    #[error("deployment {0} has no persisted state")]
    NotDeployed(String),

    #[error("{operation} is not allowed while the deployment is {phase:?}")]
    PhaseConflict {
        operation: &'static str,
        phase: DeploymentPhase,
    },

    #[error("batch run on stack {stack} failed: {report}")]
    BatchFailed { stack: StackIndex, report: BatchReport },

    #[error("{context}: {source}")]
    Collaborator {
        context: String,
        #[source]
        source: anyhow::Error,
    },
}

impl OrchestratorError {
    pub(crate) fn collaborator(context: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Collaborator {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Core(_) | Self::Rollout(_) | Self::MissingResourceClient(_) => {
                ErrorKind::Configuration
            }
            Self::State(StateError::VersionConflict { .. })
            | Self::State(StateError::IllegalTransition { .. }) => ErrorKind::Conflict,
            Self::State(StateError::NotFound(_)) => ErrorKind::Conflict,
            Self::State(_) => ErrorKind::Transient,
            Self::Traffic(TrafficError::Dns { .. }) => ErrorKind::Transient,
            Self::Traffic(_) => ErrorKind::Configuration,
            Self::Drift { .. } | Self::NotDeployed(_) | Self::PhaseConflict { .. } => {
                ErrorKind::Conflict
            }
            Self::BatchFailed { .. } => ErrorKind::PartialFailure,
            Self::Collaborator { .. } => ErrorKind::Transient,
        }
    }

    /// Whether re-running the same operation unchanged may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy() {
        let conflict = OrchestratorError::State(StateError::VersionConflict {
            key: "orders".into(),
            expected: Some(1),
            found: Some(2),
        });
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
        assert!(!conflict.is_retryable());

        let dns = OrchestratorError::Traffic(TrafficError::Dns {
            action: "write",
            route: "orders.d11load.com".into(),
            identifier: "0eg".into(),
            source: anyhow::anyhow!("throttled"),
        });
        assert_eq!(dns.kind(), ErrorKind::Transient);
        assert!(dns.is_retryable());

        let config = OrchestratorError::Core(CoreError::Validation("bad".into()));
        assert_eq!(config.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn drift_names_the_resource() {
        let err = OrchestratorError::Drift {
            name: "primary-db".into(),
            handle: ResourceHandle {
                kind: ResourceKind::Database,
                id: "cluster-7".into(),
            },
        };
        assert_eq!(
            err.to_string(),
            "resource primary-db (database:cluster-7) no longer exists"
        );
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
