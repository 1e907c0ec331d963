//! Health-check collaborator.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use helmsman_core::config::ProbeConfig;

use crate::checker::{ProbeResult, http_probe, tcp_probe};

/// Reports whether a single unit is healthy.
#[async_trait]
pub trait HealthCheckClient: Send + Sync {
    /// `Err` means the check itself could not run.
    async fn is_healthy(&self, unit_id: &str) -> anyhow::Result<bool>;
}

/// Probes units over the network using a `ProbeConfig`.
///
/// Units must be registered with a host before they can be checked.
/// With `ProbeConfig::None` every registered unit is considered healthy.
pub struct ProbeHealthClient {
    probe: ProbeConfig,
    timeout: Duration,
    hosts: RwLock<HashMap<String, String>>,
}

impl ProbeHealthClient {
    pub fn new(probe: ProbeConfig, timeout: Duration) -> Self {
        Self {
            probe,
            timeout,
            hosts: RwLock::new(HashMap::new()),
        }
    }

    /// Associate `unit_id` with the host its probes should target.
    pub fn register(&self, unit_id: impl Into<String>, host: impl Into<String>) {
        if let Ok(mut hosts) = self.hosts.write() {
            hosts.insert(unit_id.into(), host.into());
        }
    }

    pub fn deregister(&self, unit_id: &str) {
        if let Ok(mut hosts) = self.hosts.write() {
            hosts.remove(unit_id);
        }
    }

    fn host_for(&self, unit_id: &str) -> anyhow::Result<String> {
        let hosts = self
            .hosts
            .read()
            .map_err(|_| anyhow::anyhow!("health client host table poisoned"))?;
        hosts
            .get(unit_id)
            .cloned()
            .with_context(|| format!("unit {unit_id} has no registered address"))
    }
}

#[async_trait]
impl HealthCheckClient for ProbeHealthClient {
    async fn is_healthy(&self, unit_id: &str) -> anyhow::Result<bool> {
        let host = self.host_for(unit_id)?;
        let result = match &self.probe {
            ProbeConfig::None => ProbeResult::Healthy,
            ProbeConfig::Http { path, port } => {
                http_probe(&format!("{host}:{port}"), path, self.timeout).await
            }
            ProbeConfig::Tcp { port } => tcp_probe(&format!("{host}:{port}"), self.timeout).await,
        };
        Ok(result == ProbeResult::Healthy)
    }
}
