//! helmsman.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{Domain, Route, Scope, resolve_domain};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelmsmanConfig {
    pub deployment: DeploymentConfig,
    #[serde(default)]
    pub domains: Vec<Domain>,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub rolling: RollingConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Deployment identifier; also the key of the persisted state record.
    pub name: String,
    /// Directory holding the state database.
    pub data_dir: Option<PathBuf>,
}

impl DeploymentConfig {
    /// Location of the state database; `data_dir` defaults to `.helmsman`.
    pub fn state_path(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(".helmsman"))
            .join("helmsman.redb")
    }
}

/// Route names the deployment is reachable under, one per scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub internal: Option<String>,
    pub external: Option<String>,
}

impl DiscoveryConfig {
    /// Configured routes, internal first.
    pub fn routes(&self) -> Vec<Route> {
        let mut routes = Vec::with_capacity(2);
        if let Some(fqdn) = &self.internal {
            routes.push(Route::new(fqdn, Scope::Internal));
        }
        if let Some(fqdn) = &self.external {
            routes.push(Route::new(fqdn, Scope::External));
        }
        routes
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingConfig {
    /// Share of the fleet mutated per batch (1-100).
    #[serde(default = "default_batch_size_percentage")]
    pub batch_size_percentage: u32,
    /// Share of the fleet allowed to fail before aborting (0-100).
    #[serde(default)]
    pub error_tolerance_percentage: u32,
    /// When set, a deploy stops at this external canary weight and waits
    /// for an explicit promote.
    #[serde(default)]
    pub canary_percent: Option<u8>,
}

fn default_batch_size_percentage() -> u32 {
    25
}

impl Default for RollingConfig {
    fn default() -> Self {
        Self {
            batch_size_percentage: default_batch_size_percentage(),
            error_tolerance_percentage: 0,
            canary_percent: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Poll interval (e.g. "5s").
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Per-batch deadline for units to report healthy (e.g. "2m").
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Consecutive failed probes before a unit counts as unhealthy.
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
    #[serde(default)]
    pub probe: ProbeConfig,
}

fn default_interval() -> String {
    "5s".to_string()
}

fn default_timeout() -> String {
    "120s".to_string()
}

fn default_unhealthy_threshold() -> u32 {
    3
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            timeout: default_timeout(),
            unhealthy_threshold: default_unhealthy_threshold(),
            probe: ProbeConfig::default(),
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> CoreResult<Duration> {
        parse_duration(&self.interval)
            .ok_or_else(|| CoreError::Validation(format!("bad health interval {:?}", self.interval)))
    }

    pub fn timeout(&self) -> CoreResult<Duration> {
        parse_duration(&self.timeout)
            .ok_or_else(|| CoreError::Validation(format!("bad health timeout {:?}", self.timeout)))
    }
}

/// How a unit's health is probed. The `type` field selects the payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeConfig {
    Http { path: String, port: u16 },
    Tcp { port: u16 },
    /// Units are healthy as soon as the fleet accepts the mutation.
    #[default]
    None,
}

impl ProbeConfig {
    fn validate(&self) -> CoreResult<()> {
        match self {
            ProbeConfig::Http { path, port } => {
                if !path.starts_with('/') {
                    return Err(CoreError::Validation(format!(
                        "http probe path must start with '/': {path:?}"
                    )));
                }
                if *port == 0 {
                    return Err(CoreError::Validation("http probe port must be non-zero".into()));
                }
            }
            ProbeConfig::Tcp { port } => {
                if *port == 0 {
                    return Err(CoreError::Validation("tcp probe port must be non-zero".into()));
                }
            }
            ProbeConfig::None => {}
        }
        Ok(())
    }
}

impl HelmsmanConfig {
    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        toml::from_str(content).map_err(|e| CoreError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn routes(&self) -> Vec<Route> {
        self.discovery.routes()
    }

    /// Check everything that can be checked without calling out.
    pub fn validate(&self) -> CoreResult<()> {
        if self.deployment.name.trim().is_empty() {
            return Err(CoreError::Validation("deployment.name is empty".into()));
        }
        if self.domains.is_empty() {
            return Err(CoreError::Validation("at least one [[domains]] entry is required".into()));
        }
        let routes = self.routes();
        if routes.is_empty() {
            return Err(CoreError::Validation(
                "discovery needs an internal or external route".into(),
            ));
        }
        for route in &routes {
            resolve_domain(&self.domains, &route.fqdn)?;
        }

        let rolling = &self.rolling;
        if !(1..=100).contains(&rolling.batch_size_percentage) {
            return Err(CoreError::Validation(format!(
                "rolling.batch_size_percentage must be 1-100, got {}",
                rolling.batch_size_percentage
            )));
        }
        if rolling.error_tolerance_percentage > 100 {
            return Err(CoreError::Validation(format!(
                "rolling.error_tolerance_percentage must be 0-100, got {}",
                rolling.error_tolerance_percentage
            )));
        }
        if let Some(p) = rolling.canary_percent {
            if !(1..=99).contains(&p) {
                return Err(CoreError::Validation(format!(
                    "rolling.canary_percent must be 1-99, got {p}"
                )));
            }
        }

        if self.health.interval()?.is_zero() {
            return Err(CoreError::Validation("health.interval must be greater than zero".into()));
        }
        self.health.timeout()?;
        if self.health.unhealthy_threshold == 0 {
            return Err(CoreError::Validation("health.unhealthy_threshold must be at least 1".into()));
        }
        self.health.probe.validate()
    }
}

/// Parse a duration string like "5s", "500ms", "2m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok()?.checked_mul(60).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
