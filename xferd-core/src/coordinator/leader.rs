//! Fleet view and leader election
//!
//! Leadership is derived, never negotiated: the lead node is the smallest
//! live node in hostname order. Every node computes the same answer from
//! the same beacons.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::membership::{NodeBeacon, NodeId};
use super::shard_assigner::{Shard, HASH_SEGMENT_SPACE};

/// Live members at one instant, sorted by node identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetView {
    members: Vec<NodeBeacon>,
    taken_at: DateTime<Utc>,
}

impl FleetView {
    /// Keep beacons strictly younger than `staleness` at `now`
    pub fn from_beacons(beacons: Vec<NodeBeacon>, now: DateTime<Utc>, staleness: Duration) -> Self {
        let total = beacons.len();
        let mut members: Vec<NodeBeacon> = beacons
            .into_iter()
            .filter(|b| b.is_live(now, staleness))
            .collect();

        // Newest first within a node so dedup keeps the freshest beacon
        members.sort_by(|a, b| a.node.cmp(&b.node).then(b.last_seen.cmp(&a.last_seen)));
        members.dedup_by(|later, earlier| later.node == earlier.node);

        if members.len() < total {
            debug!(live = members.len(), stale = total - members.len(), "Fleet view computed");
        }
        Self {
            members,
            taken_at: now,
        }
    }

    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            members: Vec::new(),
            taken_at: now,
        }
    }

    /// Smallest live node
    pub fn lead(&self) -> Option<&NodeId> {
        self.members.first().map(|b| &b.node)
    }

    pub fn is_lead(&self, node: &NodeId) -> bool {
        self.lead() == Some(node)
    }

    pub fn index_of(&self, node: &NodeId) -> Option<usize> {
        self.members.binary_search_by(|b| b.node.cmp(node)).ok()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[NodeBeacon] {
        &self.members
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.members.iter().map(|b| &b.node)
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Slice of `[0, total_rows)` owned by `node`, if it is live
    pub fn shard_for(&self, node: &NodeId, total_rows: u64) -> Option<Shard> {
        Shard::compute(self.index_of(node)?, self.len(), total_rows)
    }

    /// Slice of the job hash segment space owned by `node`
    pub fn hash_shard_for(&self, node: &NodeId) -> Option<Shard> {
        self.shard_for(node, HASH_SEGMENT_SPACE)
    }
}

/// This node's role as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leadership {
    Lead,
    Follower,
    /// The liveness store could not be read
    Unknown,
}

impl Leadership {
    pub fn of(view: &FleetView, node: &NodeId) -> Self {
        if view.is_lead(node) {
            Leadership::Lead
        } else {
            Leadership::Follower
        }
    }

    pub fn is_lead(&self) -> bool {
        matches!(self, Leadership::Lead)
    }
}
