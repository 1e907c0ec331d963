//! Health gate: blocks until a batch of units settles.
//!
//! Each unit gets its own `HealthTracker`. Pending units are probed
//! concurrently every round; a unit leaves the pending set once its
//! tracker reaches `Healthy` or `Unhealthy`. Whatever is still pending at
//! the deadline is reported as timed out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use helmsman_core::CoreResult;
use helmsman_core::config::HealthConfig;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::checker::{HealthStatus, HealthTracker, ProbeResult};
use crate::client::HealthCheckClient;

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub interval: Duration,
    pub timeout: Duration,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

impl GateConfig {
    pub fn from_health_config(config: &HealthConfig) -> CoreResult<Self> {
        Ok(Self {
            interval: config.interval()?,
            timeout: config.timeout()?,
            healthy_threshold: 1,
            unhealthy_threshold: config.unhealthy_threshold,
        })
    }
}

/// Outcome of one `HealthGate::wait`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateReport {
    pub healthy: Vec<String>,
    pub unhealthy: Vec<String>,
    pub timed_out: Vec<String>,
}

impl GateReport {
    /// Units that did not come up healthy.
    pub fn failed(&self) -> impl Iterator<Item = &String> {
        self.unhealthy.iter().chain(self.timed_out.iter())
    }

    pub fn failed_count(&self) -> usize {
        self.unhealthy.len() + self.timed_out.len()
    }

    pub fn all_healthy(&self) -> bool {
        self.failed_count() == 0
    }
}

pub struct HealthGate {
    client: Arc<dyn HealthCheckClient>,
    config: GateConfig,
}

impl HealthGate {
    pub fn new(client: Arc<dyn HealthCheckClient>, config: GateConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Probe `units` until each is healthy or unhealthy, or the timeout
    /// elapses.
    pub async fn wait(&self, units: &[String]) -> GateReport {
        let mut report = GateReport::default();
        if units.is_empty() {
            return report;
        }

        let deadline = Instant::now() + self.config.timeout;
        let mut pending: HashMap<String, HealthTracker> = units
            .iter()
            .map(|unit| {
                let tracker = HealthTracker::new(
                    self.config.unhealthy_threshold,
                    self.config.healthy_threshold,
                    self.config.interval,
                );
                (unit.clone(), tracker)
            })
            .collect();

        debug!(units = units.len(), timeout = ?self.config.timeout, "health gate waiting");

        loop {
            let probes = pending.keys().cloned().map(|unit| {
                let client = Arc::clone(&self.client);
                async move {
                    let result = match client.is_healthy(&unit).await {
                        Ok(healthy) => ProbeResult::from(healthy),
                        Err(e) => {
                            debug!(%unit, error = %e, "health check errored");
                            ProbeResult::Failed
                        }
                    };
                    (unit, result)
                }
            });

            for (unit, result) in join_all(probes).await {
                let Some(tracker) = pending.get_mut(&unit) else {
                    continue;
                };
                match tracker.record(result) {
                    HealthStatus::Healthy => {
                        pending.remove(&unit);
                        report.healthy.push(unit);
                    }
                    HealthStatus::Unhealthy => {
                        pending.remove(&unit);
                        report.unhealthy.push(unit);
                    }
                    HealthStatus::Unknown => {}
                }
            }

            if pending.is_empty() {
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(units = pending.len(), "health gate timed out");
                report.timed_out.extend(pending.into_keys());
                break;
            }

            let next = pending
                .values()
                .map(HealthTracker::next_interval)
                .min()
                .unwrap_or(self.config.interval);
            tokio::time::sleep(next.min(deadline - now)).await;
        }

        report.healthy.sort();
        report.unhealthy.sort();
        report.timed_out.sort();

        info!(
            healthy = report.healthy.len(),
            unhealthy = report.unhealthy.len(),
            timed_out = report.timed_out.len(),
            "health gate settled"
        );
        report
    }
}
