//! StateStore — redb-backed, versioned deployment state.
//!
//! One JSON-serialized `PersistedState` per deployment. Reads are plain;
//! every write is a compare-and-swap on the record version, performed
//! inside a single redb write transaction so two writers can never both
//! succeed from the same base version.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::{debug, info, warn};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

fn decode(bytes: &[u8]) -> StateResult<PersistedState> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing and dry runs).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(DEPLOYMENT_STATES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Read the latest committed state for a deployment.
    pub fn load(&self, key: &str) -> StateResult<Option<PersistedState>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENT_STATES).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Commit a new version of a deployment's state.
    ///
    /// `base` is the version the caller read (`None` when it found no
    /// record). The write succeeds only if the stored version still equals
    /// `base`; the record is then stored as `base + 1` (or `0` for a new
    /// record) and returned.
    pub fn commit(
        &self,
        key: &str,
        base: Option<u64>,
        state: &PersistedState,
    ) -> StateResult<PersistedState> {
        let mut next = state.clone();
        next.version = match base {
            Some(v) => v + 1,
            None => 0,
        };
        let value = serde_json::to_vec(&next).map_err(map_err!(Serialize))?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DEPLOYMENT_STATES).map_err(map_err!(Table))?;
            let found = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => Some(decode(guard.value())?.version),
                None => None,
            };
            if found != base {
                warn!(%key, expected = ?base, ?found, "rejecting stale commit");
                return Err(StateError::VersionConflict {
                    key: key.to_string(),
                    expected: base,
                    found,
                });
            }
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        info!(%key, version = next.version, "state committed");
        Ok(next)
    }

    /// Overwrite a record in place without bumping its version.
    ///
    /// Used by state correction, which repairs drift but is not itself a
    /// deploy. Still rejected if the stored version moved since the read.
    pub fn store_correction(&self, key: &str, state: &PersistedState) -> StateResult<()> {
        let value = serde_json::to_vec(state).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DEPLOYMENT_STATES).map_err(map_err!(Table))?;
            let found = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => Some(decode(guard.value())?.version),
                None => None,
            };
            if found != Some(state.version) {
                return Err(StateError::VersionConflict {
                    key: key.to_string(),
                    expected: Some(state.version),
                    found,
                });
            }
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, version = state.version, "corrected state stored");
        Ok(())
    }

    /// Delete a deployment's record, guarded by the version the caller read.
    pub fn delete(&self, key: &str, version: u64) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DEPLOYMENT_STATES).map_err(map_err!(Table))?;
            let found = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => Some(decode(guard.value())?.version),
                None => None,
            };
            match found {
                None => return Err(StateError::NotFound(key.to_string())),
                Some(v) if v != version => {
                    return Err(StateError::VersionConflict {
                        key: key.to_string(),
                        expected: Some(version),
                        found,
                    });
                }
                Some(_) => {}
            }
            table.remove(key).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        info!(%key, version, "state deleted");
        Ok(())
    }

    /// List the keys of all persisted deployments.
    pub fn list_deployments(&self) -> StateResult<Vec<DeploymentId>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENT_STATES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            results.push(key.value().to_string());
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::DeploymentState;

    fn test_state() -> PersistedState {
        let mut state = PersistedState::new(DeploymentState::new(1000), "orders:1.0.0");
        state.resource_handles.insert(
            "fleet".to_string(),
            ResourceHandle {
                kind: ResourceKind::Fleet,
                id: "asg-orders-0".to_string(),
            },
        );
        state
    }

    #[test]
    fn first_commit_creates_version_zero() {
        let store = StateStore::open_in_memory().unwrap();
        let stored = store.commit("orders", None, &test_state()).unwrap();
        assert_eq!(stored.version, 0);
        assert_eq!(store.load("orders").unwrap(), Some(stored));
    }

    #[test]
    fn load_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.load("nope").unwrap().is_none());
    }

    #[test]
    fn commit_increments_by_one() {
        let store = StateStore::open_in_memory().unwrap();
        let v0 = store.commit("orders", None, &test_state()).unwrap();

        let mut next = v0.clone();
        next.image_version = "orders:1.1.0".to_string();
        let v1 = store.commit("orders", Some(v0.version), &next).unwrap();
        assert_eq!(v1.version, 1);

        let v2 = store.commit("orders", Some(v1.version), &v1).unwrap();
        assert_eq!(v2.version, 2);
        assert_eq!(store.load("orders").unwrap().unwrap().image_version, "orders:1.1.0");
    }

    #[test]
    fn second_commit_from_same_base_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        let base = store.commit("orders", None, &test_state()).unwrap();

        let mut first = base.clone();
        first.image_version = "orders:2.0.0".to_string();
        let mut second = base.clone();
        second.image_version = "orders:3.0.0".to_string();

        store.commit("orders", Some(base.version), &first).unwrap();
        let err = store.commit("orders", Some(base.version), &second).unwrap_err();
        assert!(matches!(
            err,
            StateError::VersionConflict {
                expected: Some(0),
                found: Some(1),
                ..
            }
        ));

        // The first writer's state survives.
        let stored = store.load("orders").unwrap().unwrap();
        assert_eq!(stored.image_version, "orders:2.0.0");
        assert_eq!(stored.version, 1);
    }

    #[test]
    fn concurrent_writers_from_same_base_only_one_wins() {
        let store = StateStore::open_in_memory().unwrap();
        let base = store.commit("orders", None, &test_state()).unwrap();

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let store = store.clone();
                let mut state = base.clone();
                state.image_version = format!("orders:{i}");
                std::thread::spawn(move || store.commit("orders", Some(0), &state))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(StateError::VersionConflict { .. })))
            .count();
        assert_eq!((ok, conflicts), (1, 1));
        assert_eq!(store.load("orders").unwrap().unwrap().version, 1);
    }

    #[test]
    fn create_over_existing_record_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        store.commit("orders", None, &test_state()).unwrap();
        let err = store.commit("orders", None, &test_state()).unwrap_err();
        assert!(matches!(
            err,
            StateError::VersionConflict {
                expected: None,
                found: Some(0),
                ..
            }
        ));
    }

    #[test]
    fn correction_keeps_version() {
        let store = StateStore::open_in_memory().unwrap();
        let mut stored = store.commit("orders", None, &test_state()).unwrap();
        stored.secret_exists = true;

        store.store_correction("orders", &stored).unwrap();
        let loaded = store.load("orders").unwrap().unwrap();
        assert_eq!(loaded.version, 0);
        assert!(loaded.secret_exists);
    }

    #[test]
    fn correction_against_moved_version_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        let v0 = store.commit("orders", None, &test_state()).unwrap();
        store.commit("orders", Some(0), &v0).unwrap();

        assert!(matches!(
            store.store_correction("orders", &v0),
            Err(StateError::VersionConflict { .. })
        ));
    }

    #[test]
    fn delete_is_version_guarded() {
        let store = StateStore::open_in_memory().unwrap();
        store.commit("orders", None, &test_state()).unwrap();

        assert!(matches!(
            store.delete("orders", 7),
            Err(StateError::VersionConflict { .. })
        ));
        store.delete("orders", 0).unwrap();
        assert!(store.load("orders").unwrap().is_none());
        assert!(matches!(store.delete("orders", 0), Err(StateError::NotFound(_))));
    }

    #[test]
    fn list_deployments_returns_keys() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.list_deployments().unwrap().is_empty());
        store.commit("orders", None, &test_state()).unwrap();
        store.commit("payments", None, &test_state()).unwrap();
        assert_eq!(store.list_deployments().unwrap(), vec!["orders", "payments"]);
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.commit("orders", None, &test_state()).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let state = store.load("orders").unwrap().unwrap();
        assert_eq!(state.version, 0);
        assert_eq!(state.resource_handles["fleet"].id, "asg-orders-0");
    }
}
