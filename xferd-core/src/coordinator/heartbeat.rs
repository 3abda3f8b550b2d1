//! Heartbeat
//!
//! Every tick: write our beacon, read the fleet, derive leadership and
//! shards from that one read, publish the result as an immutable
//! snapshot. Store failures are logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::leader::{FleetView, Leadership};
use super::membership::{LivenessStore, NodeBeacon, NodeId};
use super::shard_assigner::{hash_segment, Shard};
use crate::config::HeartbeatConfig;
use crate::error::Result;
use crate::metrics::standard;
use crate::protocol::JobId;
use crate::runtime::container::BackgroundService;

/// What one tick observed
#[derive(Debug, Clone)]
pub struct TickSnapshot {
    pub view: FleetView,
    pub leadership: Leadership,
    /// Slice of `[0, shard_rows)`
    pub shard: Option<Shard>,
    /// Slice of the job hash segment space
    pub hash_shard: Option<Shard>,
    pub taken_at: DateTime<Utc>,
}

impl TickSnapshot {
    pub fn unknown(now: DateTime<Utc>) -> Self {
        Self {
            view: FleetView::empty(now),
            leadership: Leadership::Unknown,
            shard: None,
            hash_shard: None,
            taken_at: now,
        }
    }

    pub fn is_lead(&self) -> bool {
        self.leadership.is_lead()
    }

    /// Whether this node schedules `job_id` under this snapshot
    pub fn owns_job(&self, job_id: &JobId) -> bool {
        self.hash_shard
            .map(|s| s.contains(hash_segment(job_id)))
            .unwrap_or(false)
    }
}

pub struct Heartbeat {
    node: NodeId,
    store: Arc<dyn LivenessStore>,
    config: HeartbeatConfig,
    snapshot_tx: watch::Sender<Arc<TickSnapshot>>,
}

impl Heartbeat {
    pub fn new(node: NodeId, store: Arc<dyn LivenessStore>, config: HeartbeatConfig) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(TickSnapshot::unknown(Utc::now())));
        Self {
            node,
            store,
            config,
            snapshot_tx,
        }
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Upsert our beacon. Failures are logged, never propagated.
    pub async fn beat(&self) -> bool {
        self.beat_at(Utc::now()).await
    }

    pub async fn beat_at(&self, now: DateTime<Utc>) -> bool {
        match self.store.put(NodeBeacon::new(self.node.clone(), now)).await {
            Ok(()) => {
                standard::BEATS_WRITTEN.inc();
                true
            }
            Err(e) => {
                standard::BEAT_FAILURES.inc();
                warn!(node = %self.node, error = %e, "Heartbeat write failed");
                false
            }
        }
    }

    /// Fresh read of the live fleet
    pub async fn compute_fleet_view(&self) -> Result<FleetView> {
        self.compute_fleet_view_at(Utc::now()).await
    }

    pub async fn compute_fleet_view_at(&self, now: DateTime<Utc>) -> Result<FleetView> {
        let beacons = self.store.list_beacons().await?;
        Ok(FleetView::from_beacons(beacons, now, self.config.staleness_window))
    }

    /// Current role, from a fresh store read
    pub async fn leadership(&self) -> Leadership {
        match self.compute_fleet_view().await {
            Ok(view) => Leadership::of(&view, &self.node),
            Err(e) => {
                warn!(error = %e, "Fleet read failed, leadership unknown");
                Leadership::Unknown
            }
        }
    }

    /// False when the store cannot be read
    pub async fn is_lead_node(&self) -> bool {
        self.leadership().await.is_lead()
    }

    /// Our slice of `[0, total_rows)` from a fresh store read
    pub async fn shard_for(&self, total_rows: u64) -> Result<Option<Shard>> {
        let view = self.compute_fleet_view().await?;
        Ok(view.shard_for(&self.node, total_rows))
    }

    pub async fn tick(&self) -> Arc<TickSnapshot> {
        self.tick_at(Utc::now()).await
    }

    /// Beat, read, derive, publish
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Arc<TickSnapshot> {
        self.beat_at(now).await;

        let snapshot = match self.compute_fleet_view_at(now).await {
            Ok(view) => {
                let leadership = Leadership::of(&view, &self.node);
                TickSnapshot {
                    shard: view.shard_for(&self.node, self.config.shard_rows),
                    hash_shard: view.hash_shard_for(&self.node),
                    leadership,
                    taken_at: now,
                    view,
                }
            }
            Err(e) => {
                warn!(error = %e, "Fleet read failed");
                TickSnapshot::unknown(now)
            }
        };

        let previous = self.snapshot_tx.borrow().leadership;
        if previous != snapshot.leadership && snapshot.leadership != Leadership::Unknown {
            info!(node = %self.node, role = ?snapshot.leadership, fleet = snapshot.view.len(), "Role changed");
        }
        standard::FLEET_SIZE.set(snapshot.view.len() as i64);
        standard::IS_LEAD.set(i64::from(snapshot.is_lead()));

        if snapshot.is_lead() {
            self.purge_stale(now).await;
        }

        let snapshot = Arc::new(snapshot);
        self.snapshot_tx.send_replace(snapshot.clone());
        debug!(
            fleet = snapshot.view.len(),
            shard = ?snapshot.shard,
            "Heartbeat tick"
        );
        snapshot
    }

    async fn purge_stale(&self, now: DateTime<Utc>) {
        let Ok(age) = chrono::Duration::from_std(self.config.purge_after) else {
            return;
        };
        if let Err(e) = self.store.purge_older_than(now - age).await {
            warn!(error = %e, "Stale beacon purge failed");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<TickSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn latest(&self) -> Arc<TickSnapshot> {
        self.snapshot_tx.borrow().clone()
    }

    /// Remove our own beacon so peers rebalance without waiting out the
    /// staleness window
    pub async fn leave(&self) {
        match self.store.remove(&self.node).await {
            Ok(_) => info!(node = %self.node, "Left fleet"),
            Err(e) => warn!(node = %self.node, error = %e, "Beacon removal failed"),
        }
    }
}

/// Periodic heartbeat tick
pub struct HeartbeatService {
    heartbeat: Arc<Heartbeat>,
}

impl HeartbeatService {
    pub fn new(heartbeat: Arc<Heartbeat>) -> Self {
        Self { heartbeat }
    }
}

#[async_trait]
impl BackgroundService for HeartbeatService {
    fn name(&self) -> &'static str {
        "heartbeat"
    }

    fn interval(&self) -> Duration {
        self.heartbeat.interval()
    }

    async fn run_once(&self) -> Result<()> {
        self.heartbeat.tick().await;
        Ok(())
    }

    async fn on_shutdown(&self) {
        self.heartbeat.leave().await;
    }
}
