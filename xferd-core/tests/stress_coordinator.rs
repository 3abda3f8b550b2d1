//! Stress tests for fleet coordination under load
//!
//! Run with: cargo test --release --test stress_coordinator -- --nocapture

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use xferd_core::config::HeartbeatConfig;
use xferd_core::coordinator::{Heartbeat, InMemoryLivenessStore, LivenessStore, NodeId};

const TOTAL_ROWS: u64 = 1_000_003;

/// Many nodes ticking concurrently converge on one lead and a full tiling
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_concurrent_ticks() {
    let num_nodes = 200;
    let store: Arc<dyn LivenessStore> = Arc::new(InMemoryLivenessStore::new());
    let config = HeartbeatConfig {
        shard_rows: TOTAL_ROWS,
        ..Default::default()
    };

    let nodes: Vec<Arc<Heartbeat>> = (0..num_nodes)
        .map(|i| {
            Arc::new(Heartbeat::new(
                NodeId::new(format!("node-{i:04}"), "xferd"),
                store.clone(),
                config.clone(),
            ))
        })
        .collect();

    for hb in &nodes {
        hb.beat().await;
    }

    let start = Instant::now();
    let handles: Vec<_> = nodes
        .iter()
        .map(|hb| {
            let hb = hb.clone();
            tokio::spawn(async move { hb.tick().await })
        })
        .collect();

    let mut snapshots = Vec::with_capacity(num_nodes);
    for handle in handles {
        snapshots.push(handle.await.unwrap());
    }
    println!("{} concurrent ticks in {:?}", num_nodes, start.elapsed());

    let leads = snapshots.iter().filter(|s| s.is_lead()).count();
    assert_eq!(leads, 1, "Exactly one lead expected");

    let mut shards: Vec<_> = snapshots.iter().filter_map(|s| s.shard).collect();
    assert_eq!(shards.len(), num_nodes);
    shards.sort_by_key(|s| s.start);
    assert_eq!(shards[0].start, 0);
    assert_eq!(shards[num_nodes - 1].end, TOTAL_ROWS);
    for pair in shards.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
    }

    let indices: HashSet<_> = shards.iter().map(|s| s.index).collect();
    assert_eq!(indices.len(), num_nodes);
}

/// Nodes leaving one by one hand leadership down the hostname order
#[tokio::test]
async fn stress_rolling_departures() {
    let store: Arc<dyn LivenessStore> = Arc::new(InMemoryLivenessStore::new());
    let nodes: Vec<Heartbeat> = (0..50)
        .map(|i| {
            Heartbeat::new(
                NodeId::new(format!("host-{i:03}"), "xferd"),
                store.clone(),
                HeartbeatConfig::default(),
            )
        })
        .collect();
    for hb in &nodes {
        hb.beat().await;
    }

    for i in 0..nodes.len() {
        assert!(nodes[i].is_lead_node().await, "host-{i:03} should lead");
        if i + 1 < nodes.len() {
            assert!(!nodes[i + 1].is_lead_node().await);
        }
        nodes[i].leave().await;
    }
    assert!(store.list_beacons().await.unwrap().is_empty());
}
