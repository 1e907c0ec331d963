//! Orchestrator — the operation pipeline for one deployment.
//!
//! Every mutating operation:
//! - loads the persisted record and runs state correction on it
//! - advances the phase machine (illegal edges fail before any mutation)
//! - shifts traffic and/or runs a batch over the fleet
//! - commits the next version, or fails with a conflict if someone else did

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use helmsman_core::{HelmsmanConfig, Route, StackIndex};
use helmsman_core::config::RollingConfig;
use helmsman_health::{GateConfig, HealthCheckClient, HealthGate};
use helmsman_rollout::{BatchExecutor, BatchPlan, CommandSpec, FleetClient};
use helmsman_state::{
    DeploymentPhase, DeploymentState, PersistedState, ResourceHandle, StateStore,
};
use helmsman_traffic::{DnsRecordClient, NestedWeights, TrafficController};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::correction::StateCorrector;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::resources::ResourceRegistry;

/// External systems the orchestrator drives.
pub struct Collaborators {
    pub dns: Arc<dyn DnsRecordClient>,
    pub fleet: Arc<dyn FleetClient>,
    pub health: Arc<dyn HealthCheckClient>,
    pub resources: ResourceRegistry,
}

/// Runs versioned operations against one deployment.
pub struct Orchestrator {
    /// Deployment name; the key of the persisted record.
    key: String,
    routes: Vec<Route>,
    rolling: RollingConfig,
    store: StateStore,
    traffic: Arc<TrafficController>,
    executor: BatchExecutor,
    corrector: StateCorrector,
    resources: ResourceRegistry,
    cancel: Option<watch::Receiver<bool>>,
}

impl Orchestrator {
    /// Validate `config` and wire the collaborators together.
    pub fn new(
        config: &HelmsmanConfig,
        store: StateStore,
        collaborators: Collaborators,
    ) -> OrchestratorResult<Self> {
        config.validate()?;

        let routes = config.routes();
        let traffic = Arc::new(TrafficController::new(
            collaborators.dns,
            config.domains.clone(),
        ));
        let gate = HealthGate::new(
            collaborators.health,
            GateConfig::from_health_config(&config.health)?,
        );
        let corrector = StateCorrector::new(
            store.clone(),
            Arc::clone(&traffic),
            collaborators.resources.clone(),
            routes.clone(),
        );

        Ok(Self {
            key: config.deployment.name.clone(),
            routes,
            rolling: config.rolling.clone(),
            store,
            traffic,
            executor: BatchExecutor::new(collaborators.fleet, gate),
            corrector,
            resources: collaborators.resources,
            cancel: None,
        })
    }

    /// Stop batch runs between batches once `cancel` turns true.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn deployment(&self) -> &str {
        &self.key
    }

    /// Latest committed record, without correction.
    pub fn status(&self) -> OrchestratorResult<Option<PersistedState>> {
        Ok(self.store.load(&self.key)?)
    }

    /// Live weights of both stacks on every configured route.
    pub async fn live_weights(&self) -> OrchestratorResult<NestedWeights> {
        Ok(self.traffic.get_all_weights(&self.routes).await?)
    }

    /// Roll `image_version` onto the inactive stack and move traffic to it.
    ///
    /// With `rolling.canary_percent` set, traffic stops at that external
    /// weight and the deployment stays `Progressing` until `promote`.
    ///
    /// A first deploy that fails its batches creates nothing: there is no
    /// record to revert, and the next deploy starts from scratch. Later
    /// failures commit the `Failed` phase.
    pub async fn deploy(&self, image_version: &str) -> OrchestratorResult<PersistedState> {
        let loaded = self.load_corrected().await?;
        let base = loaded.as_ref().map(|s| s.version);
        let mut state = loaded.unwrap_or_else(|| {
            info!(deployment = %self.key, "first deploy, creating state");
            PersistedState::new(DeploymentState::new(epoch_secs()), image_version)
        });

        let target = state.deployment_state.begin_rollout()?;
        state.pending_image_version = Some(image_version.to_string());
        info!(
            deployment = %self.key,
            %target,
            active = %state.deployment_state.active_stack(),
            image = image_version,
            "deploy started"
        );

        let command = CommandSpec::Replace {
            image_version: image_version.to_string(),
        };
        if let Err(err) = self.run_batches(target, &command).await {
            if base.is_some() && matches!(err, OrchestratorError::BatchFailed { .. }) {
                state.deployment_state.fail()?;
                let committed = self.store.commit(&self.key, base, &state)?;
                warn!(deployment = %self.key, version = committed.version, "deploy failed");
            }
            return Err(err);
        }

        match self.rolling.canary_percent {
            Some(percent) => {
                self.traffic.shift_routes(&self.routes, target, percent).await?;
                let committed = self.store.commit(&self.key, base, &state)?;
                info!(
                    deployment = %self.key,
                    %target,
                    percent,
                    version = committed.version,
                    "canary in place, waiting for promote"
                );
                Ok(committed)
            }
            None => {
                self.finish_rollout(&mut state, target).await?;
                let committed = self.store.commit(&self.key, base, &state)?;
                info!(deployment = %self.key, %target, version = committed.version, "deploy succeeded");
                Ok(committed)
            }
        }
    }

    /// Move a paused canary to full weight and retire the previous stack.
    pub async fn promote(&self) -> OrchestratorResult<PersistedState> {
        let mut state = self.require_state().await?;
        let phase = state.deployment_state.phase();
        if phase != DeploymentPhase::Progressing {
            return Err(OrchestratorError::PhaseConflict {
                operation: "promote",
                phase,
            });
        }

        let target = state.deployment_state.target_stack();
        self.finish_rollout(&mut state, target).await?;
        let committed = self.store.commit(&self.key, Some(state.version), &state)?;
        info!(deployment = %self.key, %target, version = committed.version, "promoted");
        Ok(committed)
    }

    /// Withdraw traffic from the target stack of a failed or in-flight
    /// rollout; the previous stack stays active.
    pub async fn revert(&self) -> OrchestratorResult<PersistedState> {
        let mut state = self.require_state().await?;
        if state.deployment_state.phase() == DeploymentPhase::Progressing {
            state.deployment_state.fail()?;
        }
        let phase = state.deployment_state.phase();
        let deployment = &state.deployment_state;
        // Draining the target is only safe while another stack serves.
        if phase != DeploymentPhase::Failed
            || deployment.target_stack() == deployment.active_stack()
        {
            return Err(OrchestratorError::PhaseConflict {
                operation: "revert",
                phase,
            });
        }

        let target = state.deployment_state.begin_revert()?;
        info!(deployment = %self.key, %target, "reverting");
        self.traffic.retire_stack(&self.routes, target).await?;
        state.deployment_state.complete_revert()?;
        state.pending_image_version = None;

        let committed = self.store.commit(&self.key, Some(state.version), &state)?;
        info!(
            deployment = %self.key,
            active = %committed.deployment_state.active_stack(),
            version = committed.version,
            "reverted"
        );
        Ok(committed)
    }

    /// Apply `command` to the active stack's units in health-gated batches.
    ///
    /// The phase is untouched. When the error budget is exceeded nothing
    /// is committed and `BatchFailed` reports what was done.
    pub async fn rolling_restart(&self, command: &CommandSpec) -> OrchestratorResult<PersistedState> {
        let mut state = self.require_state().await?;
        let phase = state.deployment_state.phase();
        if !phase.is_steady() {
            return Err(OrchestratorError::PhaseConflict {
                operation: "rolling restart",
                phase,
            });
        }

        let active = state.deployment_state.active_stack();
        self.run_batches(active, command).await?;
        if let CommandSpec::Replace { image_version } = command {
            state.image_version = image_version.clone();
        }

        let committed = self.store.commit(&self.key, Some(state.version), &state)?;
        info!(deployment = %self.key, %active, %command, version = committed.version, "rolling restart done");
        Ok(committed)
    }

    /// Record a resource created by a resource orchestrator.
    pub async fn record_resource(
        &self,
        name: &str,
        handle: ResourceHandle,
    ) -> OrchestratorResult<PersistedState> {
        let mut state = self.require_state().await?;
        let exists = self
            .resources
            .get(handle.kind)?
            .exists(&handle)
            .await
            .map_err(|e| OrchestratorError::collaborator(format!("checking {name} ({handle})"), e))?;
        if !exists {
            return Err(OrchestratorError::Drift {
                name: name.to_string(),
                handle,
            });
        }

        debug!(deployment = %self.key, %name, %handle, "recording resource");
        state.resource_handles.insert(name.to_string(), handle);
        Ok(self.store.commit(&self.key, Some(state.version), &state)?)
    }

    /// Mark whether the deployment secret has been created.
    pub async fn record_secret(&self, exists: bool) -> OrchestratorResult<PersistedState> {
        let mut state = self.require_state().await?;
        state.secret_exists = exists;
        Ok(self.store.commit(&self.key, Some(state.version), &state)?)
    }

    /// Destroy every resource, zero all weights, then delete the record.
    ///
    /// Handles that are already gone are skipped, so an interrupted
    /// undeploy can be re-run.
    pub async fn undeploy(&self) -> OrchestratorResult<()> {
        let state = self
            .store
            .load(&self.key)?
            .ok_or_else(|| OrchestratorError::NotDeployed(self.key.clone()))?;
        let state = self.corrector.reconcile_traffic(&self.key, state).await?.state;
        let phase = state.deployment_state.phase();
        if !phase.is_steady() {
            return Err(OrchestratorError::PhaseConflict {
                operation: "undeploy",
                phase,
            });
        }

        for (name, handle) in &state.resource_handles {
            let client = self.resources.get(handle.kind)?;
            let context = || format!("destroying {name} ({handle})");
            let exists = client
                .exists(handle)
                .await
                .map_err(|e| OrchestratorError::collaborator(context(), e))?;
            if !exists {
                debug!(%name, %handle, "already gone");
                continue;
            }
            client
                .destroy(handle)
                .await
                .map_err(|e| OrchestratorError::collaborator(context(), e))?;
            info!(deployment = %self.key, %name, %handle, "resource destroyed");
        }

        for stack in StackIndex::ALL {
            self.traffic.clear_stack(&self.routes, stack).await?;
        }
        self.store.delete(&self.key, state.version)?;
        info!(deployment = %self.key, "undeployed");
        Ok(())
    }

    async fn load_corrected(&self) -> OrchestratorResult<Option<PersistedState>> {
        match self.store.load(&self.key)? {
            Some(state) => Ok(Some(
                self.corrector.correct_state(&self.key, state).await?.state,
            )),
            None => Ok(None),
        }
    }

    async fn require_state(&self) -> OrchestratorResult<PersistedState> {
        self.load_corrected()
            .await?
            .ok_or_else(|| OrchestratorError::NotDeployed(self.key.clone()))
    }

    /// Run `command` over every unit of `stack`. Any non-successful run
    /// becomes `BatchFailed`.
    async fn run_batches(&self, stack: StackIndex, command: &CommandSpec) -> OrchestratorResult<()> {
        let units = self
            .executor
            .fleet()
            .list_units(stack)
            .await
            .map_err(|e| OrchestratorError::collaborator(format!("listing units of stack {stack}"), e))?;
        let plan = BatchPlan::from_config(units.len() as u32, &self.rolling)?;
        let report = self
            .executor
            .run(&plan, &units, command, self.cancel.clone())
            .await?;
        if !report.succeeded() {
            warn!(deployment = %self.key, %stack, %report, "batch run did not complete");
            return Err(OrchestratorError::BatchFailed { stack, report });
        }
        Ok(())
    }

    /// Give `target` all traffic, retire the other stack, mark success.
    async fn finish_rollout(
        &self,
        state: &mut PersistedState,
        target: StackIndex,
    ) -> OrchestratorResult<()> {
        self.traffic.shift_routes(&self.routes, target, 100).await?;
        self.traffic.retire_stack(&self.routes, target.other()).await?;
        state.deployment_state.complete_rollout()?;
        if let Some(image) = state.pending_image_version.take() {
            state.image_version = image;
        }
        Ok(())
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_secs_returns_reasonable_value() {
        // After 2024-01-01.
        assert!(epoch_secs() > 1_704_067_200);
    }
}
