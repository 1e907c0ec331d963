//! State correction: reconcile the persisted record with live systems.
//!
//! Runs at the start of every mutating operation, in this order:
//!
//! 1. every resource handle must still exist (a lost resource is fatal);
//! 2. weight pairs left half-written by a crash are completed;
//! 3. the active stack is re-derived from live traffic, which wins over
//!    the cached value.
//!
//! Only step 3 changes the persisted record, and it is stored without a
//! version bump.

use std::sync::Arc;

use helmsman_core::{Route, Scope, Slot, StackIndex};
use helmsman_state::{DeploymentPhase, PersistedState, StateStore};
use helmsman_traffic::TrafficController;
use tracing::{debug, info, warn};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::resources::ResourceRegistry;

/// One piece of drift that was repaired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    /// A stable/canary pair that did not sum to 100 was completed.
    HealedPair {
        route: String,
        stack: StackIndex,
        scope: Scope,
        weight: u8,
        slot: Slot,
    },
    /// A second stack at full canary weight was drained.
    RetiredStack(StackIndex),
    /// The persisted active stack was replaced by the live one.
    AdoptedActive { from: StackIndex, to: StackIndex },
}

/// Result of a correction pass.
#[derive(Debug, Clone)]
pub struct Correction {
    pub state: PersistedState,
    pub repairs: Vec<Repair>,
}

impl Correction {
    pub fn drifted(&self) -> bool {
        !self.repairs.is_empty()
    }
}

pub struct StateCorrector {
    store: StateStore,
    traffic: Arc<TrafficController>,
    resources: ResourceRegistry,
    routes: Vec<Route>,
}

impl StateCorrector {
    pub fn new(
        store: StateStore,
        traffic: Arc<TrafficController>,
        resources: ResourceRegistry,
        routes: Vec<Route>,
    ) -> Self {
        Self {
            store,
            traffic,
            resources,
            routes,
        }
    }

    /// Full correction pass for the record stored under `key`.
    pub async fn correct_state(
        &self,
        key: &str,
        state: PersistedState,
    ) -> OrchestratorResult<Correction> {
        self.verify_handles(&state).await?;
        self.reconcile_traffic(key, state).await
    }

    /// Fail with `Drift` on the first resource handle that is gone.
    pub async fn verify_handles(&self, state: &PersistedState) -> OrchestratorResult<()> {
        for (name, handle) in &state.resource_handles {
            let client = self.resources.get(handle.kind)?;
            let exists = client.exists(handle).await.map_err(|e| {
                OrchestratorError::collaborator(format!("checking {name} ({handle})"), e)
            })?;
            if !exists {
                warn!(%name, %handle, "resource handle no longer exists");
                return Err(OrchestratorError::Drift {
                    name: name.clone(),
                    handle: handle.clone(),
                });
            }
            debug!(%name, %handle, "resource verified");
        }
        Ok(())
    }

    /// Heal weight pairs and re-derive the active stack. Stores the
    /// corrected record, at the same version, only if it changed.
    pub async fn reconcile_traffic(
        &self,
        key: &str,
        mut state: PersistedState,
    ) -> OrchestratorResult<Correction> {
        let mut repairs = self.heal_pairs(state.deployment_state.phase()).await?;

        let before = state.deployment_state.clone();
        let live = self.traffic.live_stacks(&self.routes).await?;
        let live_stack = match live.as_slice() {
            [stack] => Some(*stack),
            [_, _] => {
                // The flip to the other stack landed but retiring the
                // previous one did not.
                let winner = before.active_stack().other();
                let loser = winner.other();
                warn!(deployment = %key, %winner, %loser, "two stacks at full weight");
                self.traffic.retire_stack(&self.routes, loser).await?;
                repairs.push(Repair::RetiredStack(loser));
                Some(winner)
            }
            _ => None,
        };

        if let Some(live_stack) = live_stack {
            if state.deployment_state.adopt_active(live_stack)? {
                warn!(
                    deployment = %key,
                    from = %before.active_stack(),
                    to = %live_stack,
                    phase = ?state.deployment_state.phase(),
                    "active stack re-derived from live weights"
                );
                repairs.push(Repair::AdoptedActive {
                    from: before.active_stack(),
                    to: live_stack,
                });
                if state.deployment_state.phase() == DeploymentPhase::Succeeded {
                    if let Some(image) = state.pending_image_version.take() {
                        state.image_version = image;
                    }
                }
            }
        }

        if state.deployment_state != before {
            self.store.store_correction(key, &state)?;
            info!(deployment = %key, version = state.version, "corrected state stored");
        }
        Ok(Correction { state, repairs })
    }

    /// Complete every pair whose weights do not sum to 100.
    ///
    /// Forward shifts write the canary first, so the canary is trusted.
    /// A `Failed` deployment can only have been rolling back, which writes
    /// the stable slot first, so there the stable value is trusted.
    async fn heal_pairs(&self, phase: DeploymentPhase) -> OrchestratorResult<Vec<Repair>> {
        let trusted = if phase == DeploymentPhase::Failed {
            Slot::Stable
        } else {
            Slot::Canary
        };
        let mut repairs = Vec::new();
        for route in &self.routes {
            for stack in StackIndex::ALL {
                let pair = self.traffic.get_pair(route, stack).await?;
                if pair.is_unassigned() || pair.is_balanced() {
                    continue;
                }
                let slot = trusted.other();
                let weight = 100u8.saturating_sub(pair.get(trusted));
                warn!(
                    route = %route.fqdn,
                    %stack,
                    stable = pair.stable,
                    canary = pair.canary,
                    %slot,
                    weight,
                    "healing half-written weight pair"
                );
                self.traffic.set_weight(route, stack, slot, weight).await?;
                repairs.push(Repair::HealedPair {
                    route: route.fqdn.clone(),
                    stack,
                    scope: route.scope,
                    weight,
                    slot,
                });
            }
        }
        Ok(repairs)
    }
}
