//! Fleet-mutation collaborator.
//!
//! The executor never talks to a cloud API directly; it issues
//! `CommandSpec`s through `FleetClient`. `InMemoryFleetClient` applies
//! commands to an in-process unit table and is used by dry runs and tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use helmsman_core::StackIndex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A mutation applied to each unit of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CommandSpec {
    /// Restart the unit in place.
    Restart,
    /// Replace the unit with one running `image_version`.
    Replace { image_version: String },
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandSpec::Restart => write!(f, "restart"),
            CommandSpec::Replace { image_version } => write!(f, "replace({image_version})"),
        }
    }
}

/// Per-unit answer to a mutation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitAck {
    pub unit_id: String,
    pub accepted: bool,
}

#[async_trait]
pub trait FleetClient: Send + Sync {
    /// Units currently provisioned for `stack`, in a stable order.
    async fn list_units(&self, stack: StackIndex) -> anyhow::Result<Vec<String>>;

    /// Apply `command` to each unit. One ack per requested unit.
    async fn mutate(&self, unit_ids: &[String], command: &CommandSpec)
    -> anyhow::Result<Vec<UnitAck>>;
}

/// In-process fleet: units per stack, their image, and a command log.
#[derive(Clone, Default)]
pub struct InMemoryFleetClient {
    units: Arc<RwLock<BTreeMap<StackIndex, Vec<String>>>>,
    images: Arc<RwLock<HashMap<String, String>>>,
    applied: Arc<RwLock<Vec<(String, CommandSpec)>>>,
    rejecting: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryFleetClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision `count` units for `stack`, named `{prefix}-{n}`.
    pub fn provision(&self, stack: StackIndex, prefix: &str, count: u32) -> Vec<String> {
        let ids: Vec<String> = (0..count).map(|n| format!("{prefix}-{n}")).collect();
        self.units
            .write()
            .expect("fleet lock")
            .entry(stack)
            .or_default()
            .extend(ids.iter().cloned());
        ids
    }

    /// Make every mutation of `unit_id` come back rejected.
    pub fn reject(&self, unit_id: &str) {
        self.rejecting
            .write()
            .expect("fleet lock")
            .insert(unit_id.to_string());
    }

    pub fn image_of(&self, unit_id: &str) -> Option<String> {
        self.images.read().expect("fleet lock").get(unit_id).cloned()
    }

    /// Accepted commands, oldest first.
    pub fn applied(&self) -> Vec<(String, CommandSpec)> {
        self.applied.read().expect("fleet lock").clone()
    }
}

#[async_trait]
impl FleetClient for InMemoryFleetClient {
    async fn list_units(&self, stack: StackIndex) -> anyhow::Result<Vec<String>> {
        Ok(self
            .units
            .read()
            .expect("fleet lock")
            .get(&stack)
            .cloned()
            .unwrap_or_default())
    }

    async fn mutate(
        &self,
        unit_ids: &[String],
        command: &CommandSpec,
    ) -> anyhow::Result<Vec<UnitAck>> {
        let rejecting = self.rejecting.read().expect("fleet lock").clone();
        let mut acks = Vec::with_capacity(unit_ids.len());
        for unit_id in unit_ids {
            let accepted = !rejecting.contains(unit_id);
            if accepted {
                if let CommandSpec::Replace { image_version } = command {
                    self.images
                        .write()
                        .expect("fleet lock")
                        .insert(unit_id.clone(), image_version.clone());
                }
                self.applied
                    .write()
                    .expect("fleet lock")
                    .push((unit_id.clone(), command.clone()));
            }
            debug!(%unit_id, %command, accepted, "unit mutated");
            acks.push(UnitAck {
                unit_id: unit_id.clone(),
                accepted,
            });
        }
        Ok(acks)
    }
}
