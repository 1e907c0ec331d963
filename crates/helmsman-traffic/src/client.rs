//! DNS-record collaborator.
//!
//! The controller talks to the provider's weighted-record API through
//! `DnsRecordClient`. `InMemoryDnsClient` keeps records in a map and logs
//! every write, for dry runs and tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

/// A weighted DNS record as seen by the controller.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WeightRecord {
    pub identifier: String,
    pub weight: u8,
}

/// Weighted-record operations of a DNS provider.
#[async_trait]
pub trait DnsRecordClient: Send + Sync {
    /// Fetch one record. `Ok(None)` when it does not exist.
    async fn get(
        &self,
        zone_id: &str,
        route: &str,
        identifier: &str,
    ) -> anyhow::Result<Option<WeightRecord>>;

    /// Create or overwrite one record with an absolute weight.
    async fn set(&self, zone_id: &str, route: &str, identifier: &str, weight: u8)
    -> anyhow::Result<()>;
}

/// One applied write, in order of application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordWrite {
    pub zone_id: String,
    pub route: String,
    pub identifier: String,
    pub weight: u8,
}

type RecordKey = (String, String, String);

/// In-process weighted-record table.
#[derive(Clone, Default)]
pub struct InMemoryDnsClient {
    records: Arc<RwLock<HashMap<RecordKey, u8>>>,
    writes: Arc<RwLock<Vec<RecordWrite>>>,
    failing: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryDnsClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record without logging a write.
    pub fn insert(&self, zone_id: &str, route: &str, identifier: &str, weight: u8) {
        let mut records = self.records.write().expect("dns lock");
        records.insert(key(zone_id, route, identifier), weight);
    }

    /// Current weight of a record, if it exists.
    pub fn weight(&self, zone_id: &str, route: &str, identifier: &str) -> Option<u8> {
        let records = self.records.read().expect("dns lock");
        records.get(&key(zone_id, route, identifier)).copied()
    }

    /// Every successful `set`, oldest first.
    pub fn writes(&self) -> Vec<RecordWrite> {
        self.writes.read().expect("dns lock").clone()
    }

    pub fn clear_writes(&self) {
        self.writes.write().expect("dns lock").clear();
    }

    /// Make every `set` for `identifier` fail until cleared.
    pub fn fail_writes_to(&self, identifier: &str) {
        self.failing
            .write()
            .expect("dns lock")
            .insert(identifier.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.write().expect("dns lock").clear();
    }
}

fn key(zone_id: &str, route: &str, identifier: &str) -> RecordKey {
    (
        zone_id.to_string(),
        route.to_string(),
        identifier.to_string(),
    )
}

#[async_trait]
impl DnsRecordClient for InMemoryDnsClient {
    async fn get(
        &self,
        zone_id: &str,
        route: &str,
        identifier: &str,
    ) -> anyhow::Result<Option<WeightRecord>> {
        Ok(self
            .weight(zone_id, route, identifier)
            .map(|weight| WeightRecord {
                identifier: identifier.to_string(),
                weight,
            }))
    }

    async fn set(
        &self,
        zone_id: &str,
        route: &str,
        identifier: &str,
        weight: u8,
    ) -> anyhow::Result<()> {
        if self.failing.read().expect("dns lock").contains(identifier) {
            anyhow::bail!("injected failure writing {identifier}");
        }
        self.insert(zone_id, route, identifier, weight);
        self.writes.write().expect("dns lock").push(RecordWrite {
            zone_id: zone_id.to_string(),
            route: route.to_string(),
            identifier: identifier.to_string(),
            weight,
        });
        debug!(zone_id, route, identifier, weight, "record written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_unknown_returns_none() {
        let dns = InMemoryDnsClient::new();
        assert!(dns.get("Z1", "api.example.com", "0eb").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_then_get() {
        let dns = InMemoryDnsClient::new();
        dns.set("Z1", "api.example.com", "0eb", 60).await.unwrap();

        let record = dns.get("Z1", "api.example.com", "0eb").await.unwrap().unwrap();
        assert_eq!(record.weight, 60);
        assert_eq!(record.identifier, "0eb");
        // Other zones are independent.
        assert!(dns.get("Z2", "api.example.com", "0eb").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn writes_are_logged_in_order() {
        let dns = InMemoryDnsClient::new();
        dns.insert("Z1", "api.example.com", "0eb", 100);
        dns.set("Z1", "api.example.com", "0eg", 10).await.unwrap();
        dns.set("Z1", "api.example.com", "0eb", 90).await.unwrap();

        let ids: Vec<_> = dns.writes().into_iter().map(|w| w.identifier).collect();
        assert_eq!(ids, vec!["0eg", "0eb"]);
    }

    #[tokio::test]
    async fn injected_failure_leaves_record_untouched() {
        let dns = InMemoryDnsClient::new();
        dns.insert("Z1", "api.example.com", "0eb", 100);
        dns.fail_writes_to("0eb");

        assert!(dns.set("Z1", "api.example.com", "0eb", 0).await.is_err());
        assert_eq!(dns.weight("Z1", "api.example.com", "0eb"), Some(100));
        assert!(dns.writes().is_empty());

        dns.clear_failures();
        dns.set("Z1", "api.example.com", "0eb", 0).await.unwrap();
        assert_eq!(dns.weight("Z1", "api.example.com", "0eb"), Some(0));
    }
}
