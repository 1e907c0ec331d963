//! Live resource collaborators, one per resource kind.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use helmsman_state::{ResourceHandle, ResourceKind};
use tracing::debug;

use crate::error::{OrchestratorError, OrchestratorResult};

/// Queries and tears down provisioned resources of one kind.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn exists(&self, handle: &ResourceHandle) -> anyhow::Result<bool>;

    /// Tear the resource down. Destroying a missing resource is not an error.
    async fn destroy(&self, handle: &ResourceHandle) -> anyhow::Result<()>;
}

/// Resource clients keyed by the kind of handle they understand.
#[derive(Clone, Default)]
pub struct ResourceRegistry {
    clients: BTreeMap<ResourceKind, Arc<dyn ResourceClient>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: ResourceKind, client: Arc<dyn ResourceClient>) -> Self {
        self.clients.insert(kind, client);
        self
    }

    pub fn get(&self, kind: ResourceKind) -> OrchestratorResult<&Arc<dyn ResourceClient>> {
        self.clients
            .get(&kind)
            .ok_or(OrchestratorError::MissingResourceClient(kind))
    }
}

/// Resource ids held in memory.
#[derive(Clone, Default)]
pub struct InMemoryResourceClient {
    ids: Arc<RwLock<HashSet<String>>>,
    destroyed: Arc<RwLock<Vec<String>>>,
}

impl InMemoryResourceClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, id: &str) {
        self.ids.write().expect("resource lock").insert(id.to_string());
    }

    /// Drop a resource behind the orchestrator's back.
    pub fn lose(&self, id: &str) {
        self.ids.write().expect("resource lock").remove(id);
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed.read().expect("resource lock").clone()
    }
}

#[async_trait]
impl ResourceClient for InMemoryResourceClient {
    async fn exists(&self, handle: &ResourceHandle) -> anyhow::Result<bool> {
        Ok(self.ids.read().expect("resource lock").contains(&handle.id))
    }

    async fn destroy(&self, handle: &ResourceHandle) -> anyhow::Result<()> {
        if self.ids.write().expect("resource lock").remove(&handle.id) {
            self.destroyed
                .write()
                .expect("resource lock")
                .push(handle.id.clone());
            debug!(%handle, "resource destroyed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registry_dispatches_by_kind() {
        let caches = InMemoryResourceClient::new();
        caches.create("redis-1");
        let registry = ResourceRegistry::new().register(ResourceKind::Cache, Arc::new(caches));

        let handle = ResourceHandle {
            kind: ResourceKind::Cache,
            id: "redis-1".into(),
        };
        assert!(registry.get(ResourceKind::Cache).unwrap().exists(&handle).await.unwrap());
        assert!(matches!(
            registry.get(ResourceKind::Database),
            Err(OrchestratorError::MissingResourceClient(ResourceKind::Database))
        ));
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let client = InMemoryResourceClient::new();
        client.create("asg-1");
        let handle = ResourceHandle {
            kind: ResourceKind::Fleet,
            id: "asg-1".into(),
        };

        client.destroy(&handle).await.unwrap();
        client.destroy(&handle).await.unwrap();
        assert!(!client.exists(&handle).await.unwrap());
        assert_eq!(client.destroyed(), vec!["asg-1"]);
    }
}
