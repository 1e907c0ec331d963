use std::fmt::Write as _;
use std::path::Path;

use helmsman_core::{HelmsmanConfig, resolve_domain};
use helmsman_state::StateStore;
use tracing::debug;

/// Validate a config file and summarise what it configures.
pub fn validate(path: &Path) -> anyhow::Result<String> {
    let config = HelmsmanConfig::load(path)?;

    let mut out = format!(
        "✓ {} is valid (deployment {})\n",
        path.display(),
        config.deployment.name
    );
    for route in config.routes() {
        let domain = resolve_domain(&config.domains, &route.fqdn)?;
        writeln!(out, "  route {route} → zone {} ({})", domain.dns_zone_id, domain.id)?;
    }
    let rolling = &config.rolling;
    write!(
        out,
        "  batches of {}%, error tolerance {}%",
        rolling.batch_size_percentage, rolling.error_tolerance_percentage
    )?;
    if let Some(p) = rolling.canary_percent {
        write!(out, ", canary at {p}%")?;
    }
    Ok(out)
}

/// Print the persisted record of the configured deployment as JSON.
pub fn state(path: &Path) -> anyhow::Result<String> {
    let config = HelmsmanConfig::load(path)?;
    let db_path = config.deployment.state_path();
    if !db_path.exists() {
        return Ok(format!("no state store at {}", db_path.display()));
    }

    let store = StateStore::open(&db_path)?;
    debug!(path = ?db_path, "state store opened");
    match store.load(&config.deployment.name)? {
        Some(state) => Ok(serde_json::to_string_pretty(&state)?),
        None => Ok(format!(
            "no persisted state for deployment {}",
            config.deployment.name
        )),
    }
}
