//! Fleet membership beacons
//!
//! Each node upserts its own beacon every heartbeat; every node reads all
//! beacons to enumerate the fleet. Readers never delete peer rows.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::Result;

/// Node identity, ordered by hostname then service name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub hostname: String,
    pub service_name: String,
}

impl NodeId {
    pub fn new(hostname: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            service_name: service_name.into(),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.hostname, self.service_name)
    }
}

/// Liveness record of one fleet member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeBeacon {
    pub node: NodeId,
    /// Last heartbeat written by the owning node
    pub last_seen: DateTime<Utc>,
    /// OS process id of the owning node
    pub pid: u32,
}

impl NodeBeacon {
    pub fn new(node: NodeId, last_seen: DateTime<Utc>) -> Self {
        Self {
            node,
            last_seen,
            pid: std::process::id(),
        }
    }

    /// Live iff strictly younger than `window` at `now`
    pub fn is_live(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(self.last_seen) < window
    }
}

/// Store holding one beacon per node
#[async_trait]
pub trait LivenessStore: Send + Sync {
    /// Insert or replace the beacon of `beacon.node`
    async fn put(&self, beacon: NodeBeacon) -> Result<()>;

    /// All beacons, live or stale
    async fn list_beacons(&self) -> Result<Vec<NodeBeacon>>;

    /// Remove one node's beacon, returns whether it existed
    async fn remove(&self, node: &NodeId) -> Result<bool>;

    /// Remove beacons last seen before `cutoff`, returns how many
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// Process-local liveness store
#[derive(Default)]
pub struct InMemoryLivenessStore {
    beacons: RwLock<HashMap<NodeId, NodeBeacon>>,
}

impl InMemoryLivenessStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LivenessStore for InMemoryLivenessStore {
    async fn put(&self, beacon: NodeBeacon) -> Result<()> {
        debug!(node = %beacon.node, last_seen = %beacon.last_seen, "Beacon written");
        self.beacons.write().await.insert(beacon.node.clone(), beacon);
        Ok(())
    }

    async fn list_beacons(&self) -> Result<Vec<NodeBeacon>> {
        Ok(self.beacons.read().await.values().cloned().collect())
    }

    async fn remove(&self, node: &NodeId) -> Result<bool> {
        Ok(self.beacons.write().await.remove(node).is_some())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut beacons = self.beacons.write().await;
        let before = beacons.len();
        beacons.retain(|_, b| b.last_seen >= cutoff);
        let purged = before - beacons.len();
        if purged > 0 {
            info!("Purged {} stale beacons", purged);
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_order_is_hostname_then_service() {
        let mut nodes = vec![
            NodeId::new("b", "a"),
            NodeId::new("a", "z"),
            NodeId::new("a", "b"),
        ];
        nodes.sort();
        assert_eq!(nodes[0], NodeId::new("a", "b"));
        assert_eq!(nodes[1], NodeId::new("a", "z"));
        assert_eq!(nodes[2], NodeId::new("b", "a"));
    }

    #[test]
    fn test_liveness_boundary_is_exclusive() {
        let now = Utc::now();
        let window = Duration::from_secs(120);
        let at = |secs| NodeBeacon::new(NodeId::new("h", "s"), now - chrono::Duration::seconds(secs));

        assert!(at(119).is_live(now, window));
        assert!(!at(120).is_live(now, window));
        assert!(!at(121).is_live(now, window));
    }

    #[tokio::test]
    async fn test_upsert_and_purge() {
        let store = InMemoryLivenessStore::new();
        let now = Utc::now();
        let node = NodeId::new("h1", "xferd");

        store.put(NodeBeacon::new(node.clone(), now - chrono::Duration::seconds(900))).await.unwrap();
        store.put(NodeBeacon::new(node.clone(), now)).await.unwrap();
        store
            .put(NodeBeacon::new(NodeId::new("h2", "xferd"), now - chrono::Duration::seconds(900)))
            .await
            .unwrap();
        assert_eq!(store.list_beacons().await.unwrap().len(), 2);

        let purged = store
            .purge_older_than(now - chrono::Duration::seconds(600))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert!(store.remove(&node).await.unwrap());
        assert!(store.list_beacons().await.unwrap().is_empty());
    }
}
