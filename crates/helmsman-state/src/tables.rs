//! redb table definitions for the Helmsman state store.
//!
//! Values are JSON-serialized `PersistedState` records.

use redb::TableDefinition;

/// Persisted deployment state keyed by deployment name.
pub const DEPLOYMENT_STATES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("deployment_states");
