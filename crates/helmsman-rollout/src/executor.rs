//! Batch executor: drives a `BatchPlan` against the fleet.
//!
//! Batches run strictly one after another. Inside a batch every unit is
//! mutated concurrently, then the health gate acts as a barrier until the
//! batch's units settle. Cancellation is observed only between batches.

use std::fmt;
use std::sync::Arc;

use futures_util::future::join_all;
use helmsman_health::HealthGate;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::RolloutResult;
use crate::fleet::{CommandSpec, FleetClient};
use crate::plan::BatchPlan;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every batch ran and the failures stayed within budget.
    Succeeded,
    /// Cumulative failures exceeded the error budget.
    BudgetExceeded,
    /// Cancelled between batches.
    Cancelled,
}

/// Outcome of a run, with enough detail to act on a partial failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub status: BatchStatus,
    pub batches_total: usize,
    pub batches_completed: usize,
    pub units_mutated: u32,
    pub units_failed: u32,
    pub error_budget: u32,
    pub failed_units: Vec<String>,
}

impl BatchReport {
    pub fn succeeded(&self) -> bool {
        self.status == BatchStatus::Succeeded
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status {
            BatchStatus::Succeeded => "succeeded",
            BatchStatus::BudgetExceeded => "error budget exceeded",
            BatchStatus::Cancelled => "cancelled",
        };
        write!(
            f,
            "{status}: {}/{} batches completed, {} units mutated, {} failed (budget {})",
            self.batches_completed,
            self.batches_total,
            self.units_mutated,
            self.units_failed,
            self.error_budget
        )
    }
}

pub struct BatchExecutor {
    fleet: Arc<dyn FleetClient>,
    gate: HealthGate,
}

impl BatchExecutor {
    pub fn new(fleet: Arc<dyn FleetClient>, gate: HealthGate) -> Self {
        Self { fleet, gate }
    }

    pub fn fleet(&self) -> &Arc<dyn FleetClient> {
        &self.fleet
    }

    /// Apply `command` to `units` following `plan`.
    ///
    /// Fails only if `units` does not match the plan. Unit-level failures
    /// (rejected acks, client errors, units that never turn healthy) are
    /// counted in the report rather than returned as errors.
    pub async fn run(
        &self,
        plan: &BatchPlan,
        units: &[String],
        command: &CommandSpec,
        cancel: Option<watch::Receiver<bool>>,
    ) -> RolloutResult<BatchReport> {
        let batches = plan.split(units)?;
        let mut report = BatchReport {
            status: BatchStatus::Succeeded,
            batches_total: batches.len(),
            batches_completed: 0,
            units_mutated: 0,
            units_failed: 0,
            error_budget: plan.error_budget,
            failed_units: Vec::new(),
        };

        info!(
            units = plan.total_units,
            batches = batches.len(),
            batch_size = plan.batch_size,
            budget = plan.error_budget,
            %command,
            "starting batch run"
        );

        for (index, batch) in batches.into_iter().enumerate() {
            let batch_no = index + 1;

            if cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
                warn!(batch = batch_no, "batch run cancelled");
                report.status = BatchStatus::Cancelled;
                return Ok(report);
            }

            info!(batch = batch_no, units = batch.len(), "batch started");

            let (accepted, mut failed) = self.mutate_batch(batch, command).await;
            report.units_mutated += accepted.len() as u32;

            let gate = self.gate.wait(&accepted).await;
            failed.extend(gate.failed().cloned());
            failed.sort();

            report.units_failed += failed.len() as u32;
            report.batches_completed += 1;
            info!(
                batch = batch_no,
                healthy = gate.healthy.len(),
                failed = failed.len(),
                total_failed = report.units_failed,
                "batch finished"
            );
            report.failed_units.extend(failed);

            if report.units_failed > plan.error_budget {
                warn!(
                    batch = batch_no,
                    failed = report.units_failed,
                    budget = plan.error_budget,
                    "error budget exceeded; remaining batches skipped"
                );
                report.status = BatchStatus::BudgetExceeded;
                return Ok(report);
            }
        }

        info!(
            batches = report.batches_completed,
            failed = report.units_failed,
            "batch run succeeded"
        );
        Ok(report)
    }

    /// Mutate every unit of a batch concurrently.
    /// Returns (accepted units, failed units).
    async fn mutate_batch(
        &self,
        batch: &[String],
        command: &CommandSpec,
    ) -> (Vec<String>, Vec<String>) {
        let calls = batch.iter().map(|unit| {
            let fleet = Arc::clone(&self.fleet);
            async move {
                let accepted = match fleet.mutate(std::slice::from_ref(unit), command).await {
                    Ok(acks) => acks.iter().any(|ack| &ack.unit_id == unit && ack.accepted),
                    Err(e) => {
                        warn!(%unit, error = %e, "unit mutation failed");
                        false
                    }
                };
                (unit.clone(), accepted)
            }
        });

        let mut accepted = Vec::with_capacity(batch.len());
        let mut failed = Vec::new();
        for (unit, ok) in join_all(calls).await {
            if ok {
                accepted.push(unit);
            } else {
                debug!(%unit, "unit rejected mutation");
                failed.push(unit);
            }
        }
        (accepted, failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::{InMemoryFleetClient, UnitAck};
    use async_trait::async_trait;
    use helmsman_core::StackIndex;
    use helmsman_health::{GateConfig, HealthCheckClient};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    struct StaticHealth {
        unhealthy: HashSet<String>,
    }

    #[async_trait]
    impl HealthCheckClient for StaticHealth {
        async fn is_healthy(&self, unit_id: &str) -> anyhow::Result<bool> {
            Ok(!self.unhealthy.contains(unit_id))
        }
    }

    fn gate(unhealthy: &[&str]) -> HealthGate {
        let client = StaticHealth {
            unhealthy: unhealthy.iter().map(|s| s.to_string()).collect(),
        };
        HealthGate::new(
            Arc::new(client),
            GateConfig {
                interval: Duration::from_millis(2),
                timeout: Duration::from_millis(200),
                healthy_threshold: 1,
                unhealthy_threshold: 2,
            },
        )
    }

    fn replace() -> CommandSpec {
        CommandSpec::Replace {
            image_version: "v2".into(),
        }
    }

    #[tokio::test]
    async fn all_batches_run_in_order() {
        let fleet = InMemoryFleetClient::new();
        let units = fleet.provision(StackIndex::Zero, "u", 23);
        let executor = BatchExecutor::new(Arc::new(fleet.clone()), gate(&[]));

        let plan = BatchPlan::new(23, 10, 5).unwrap();
        let report = executor.run(&plan, &units, &replace(), None).await.unwrap();

        assert!(report.succeeded());
        assert_eq!(report.batches_completed, 8);
        assert_eq!(report.units_mutated, 23);
        assert_eq!(report.units_failed, 0);
        assert!(units.iter().all(|u| fleet.image_of(u).as_deref() == Some("v2")));
    }

    #[tokio::test]
    async fn failures_within_budget_still_succeed() {
        let fleet = InMemoryFleetClient::new();
        let units = fleet.provision(StackIndex::Zero, "u", 23);
        let executor = BatchExecutor::new(Arc::new(fleet), gate(&["u-4"]));

        let plan = BatchPlan::new(23, 10, 5).unwrap();
        let report = executor.run(&plan, &units, &replace(), None).await.unwrap();

        assert!(report.succeeded());
        assert_eq!(report.units_failed, 1);
        assert_eq!(report.failed_units, vec!["u-4"]);
    }

    #[tokio::test]
    async fn exceeding_budget_stops_remaining_batches() {
        let fleet = InMemoryFleetClient::new();
        let units = fleet.provision(StackIndex::Zero, "u", 23);
        fleet.reject("u-1");
        let executor = BatchExecutor::new(Arc::new(fleet.clone()), gate(&["u-4"]));

        let plan = BatchPlan::new(23, 10, 5).unwrap();
        let report = executor.run(&plan, &units, &replace(), None).await.unwrap();

        // u-1 fails in batch 1 (within budget), u-4 in batch 2 exceeds it.
        assert_eq!(report.status, BatchStatus::BudgetExceeded);
        assert_eq!(report.batches_completed, 2);
        assert_eq!(report.units_failed, 2);
        assert_eq!(report.failed_units, vec!["u-1", "u-4"]);
        // Completed batches keep their new state; later batches were untouched.
        assert_eq!(fleet.image_of("u-5").as_deref(), Some("v2"));
        assert_eq!(fleet.image_of("u-6"), None);
    }

    #[tokio::test]
    async fn cancellation_is_observed_between_batches() {
        let fleet = InMemoryFleetClient::new();
        let units = fleet.provision(StackIndex::Zero, "u", 4);
        let executor = BatchExecutor::new(Arc::new(fleet.clone()), gate(&[]));
        let (tx, rx) = watch::channel(false);

        tx.send(true).unwrap();
        let plan = BatchPlan::new(4, 50, 0).unwrap();
        let report = executor.run(&plan, &units, &CommandSpec::Restart, Some(rx)).await.unwrap();

        assert_eq!(report.status, BatchStatus::Cancelled);
        assert_eq!(report.batches_completed, 0);
        assert!(fleet.applied().is_empty());
    }

    /// Errors on every call for one unit.
    struct FlakyFleet {
        broken: String,
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl FleetClient for FlakyFleet {
        async fn list_units(&self, _stack: StackIndex) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn mutate(
            &self,
            unit_ids: &[String],
            _command: &CommandSpec,
        ) -> anyhow::Result<Vec<UnitAck>> {
            self.calls.lock().unwrap().push(unit_ids.to_vec());
            if unit_ids.contains(&self.broken) {
                anyhow::bail!("api throttled");
            }
            Ok(unit_ids
                .iter()
                .map(|u| UnitAck {
                    unit_id: u.clone(),
                    accepted: true,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn client_errors_count_as_failed_units() {
        let fleet = Arc::new(FlakyFleet {
            broken: "u-0".into(),
            calls: Mutex::new(Vec::new()),
        });
        let executor = BatchExecutor::new(fleet.clone(), gate(&[]));
        let units: Vec<String> = (0..3).map(|i| format!("u-{i}")).collect();

        let plan = BatchPlan::new(3, 100, 0).unwrap();
        let report = executor.run(&plan, &units, &CommandSpec::Restart, None).await.unwrap();

        assert_eq!(report.status, BatchStatus::BudgetExceeded);
        assert_eq!(report.units_mutated, 2);
        assert_eq!(report.failed_units, vec!["u-0"]);
        // One call per unit.
        assert_eq!(fleet.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn mismatched_units_rejected_before_mutation() {
        let fleet = InMemoryFleetClient::new();
        let units = fleet.provision(StackIndex::Zero, "u", 3);
        let executor = BatchExecutor::new(Arc::new(fleet.clone()), gate(&[]));

        let plan = BatchPlan::new(4, 50, 0).unwrap();
        assert!(executor.run(&plan, &units, &CommandSpec::Restart, None).await.is_err());
        assert!(fleet.applied().is_empty());
    }

    #[test]
    fn report_display_names_counts() {
        let report = BatchReport {
            status: BatchStatus::BudgetExceeded,
            batches_total: 8,
            batches_completed: 3,
            units_mutated: 9,
            units_failed: 2,
            error_budget: 1,
            failed_units: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            report.to_string(),
            "error budget exceeded: 3/8 batches completed, 9 units mutated, 2 failed (budget 1)"
        );
    }
}
