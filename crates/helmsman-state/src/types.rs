//! Domain types for the Helmsman state store.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::phase::DeploymentState;

/// Unique identifier for a deployment; the key of its state record.
pub type DeploymentId = String;

/// Kind of cloud resource a handle points at. Selects the live-query
/// client used to verify it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Fleet,
    Database,
    Cache,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Fleet => f.write_str("fleet"),
            ResourceKind::Database => f.write_str("database"),
            ResourceKind::Cache => f.write_str("cache"),
        }
    }
}

/// Opaque cloud identifier created by a resource orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub kind: ResourceKind,
    /// Provider identifier (ARN, cluster id, ...).
    pub id: String,
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// The single record persisted between operation invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Incremented by exactly one on every committed mutation.
    pub version: u64,
    pub deployment_state: DeploymentState,
    /// Resource name → handle. Only orchestrators add entries.
    #[serde(default)]
    pub resource_handles: BTreeMap<String, ResourceHandle>,
    pub image_version: String,
    /// Image rolled onto the target stack while a rollout is in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_image_version: Option<String>,
    #[serde(default)]
    pub secret_exists: bool,
}

impl PersistedState {
    /// A record that has not been committed yet (`version` 0).
    pub fn new(deployment_state: DeploymentState, image_version: &str) -> Self {
        Self {
            version: 0,
            deployment_state,
            resource_handles: BTreeMap::new(),
            image_version: image_version.to_string(),
            pending_image_version: None,
            secret_exists: false,
        }
    }
}
