//! Fleet coordination
//!
//! Heartbeat liveness, derived leader election, deterministic sharding and
//! the stall watchdog that fences a stuck node out of the fleet.

pub mod fs_store;
pub mod heartbeat;
pub mod leader;
pub mod membership;
pub mod shard_assigner;
pub mod watchdog;

pub use fs_store::FsLivenessStore;
pub use heartbeat::{Heartbeat, HeartbeatService, TickSnapshot};
pub use leader::{FleetView, Leadership};
pub use membership::{InMemoryLivenessStore, LivenessStore, NodeBeacon, NodeId};
pub use shard_assigner::{hash_segment, partition, Shard, HASH_SEGMENT_SPACE};
pub use watchdog::{
    CriticalPath, CriticalTimestamps, Expired, StallWatchdog, WatchdogService, WatchdogState,
};
