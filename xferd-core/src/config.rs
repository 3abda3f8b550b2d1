//! Node configuration
//!
//! Every section has working defaults; a TOML file may override any
//! subset of fields. Durations are written in humantime form ("30s").

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::concurrency::{AdmissionBand, AdmissionMode};
use crate::coordinator::NodeId;
use crate::error::{Result, XferdError};

/// Top-level configuration for one fleet node
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct XferdConfig {
    pub node: NodeConfig,
    pub heartbeat: HeartbeatConfig,
    pub watchdog: WatchdogConfig,
    pub channel: ChannelConfig,
    pub stall: StallConfig,
    pub shutdown: ShutdownConfig,
    pub runtime: RuntimeConfig,
    pub bands: BandConfig,
}

impl XferdConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| -> Result<()> {
            Err(XferdError::InvalidConfig {
                reason: reason.to_string(),
            })
        };

        if self.node.hostname.trim().is_empty() || self.node.service_name.trim().is_empty() {
            return invalid("node hostname and service name must be non-empty");
        }
        if self.heartbeat.interval.is_zero() {
            return invalid("heartbeat interval must be non-zero");
        }
        if self.heartbeat.staleness_window < self.heartbeat.interval {
            return invalid("staleness window must be at least one heartbeat interval");
        }
        if self.heartbeat.purge_after < self.heartbeat.staleness_window {
            return invalid("purge_after must not be shorter than the staleness window");
        }
        if self.watchdog.retrieve_threshold.is_zero()
            || self.watchdog.update_threshold.is_zero()
            || self.watchdog.stall_threshold.is_zero()
        {
            return invalid("watchdog thresholds must be non-zero");
        }
        if self.channel.capacity == 0 || self.channel.max_drain_per_cycle == 0 {
            return invalid("channel capacity and drain batch must be non-zero");
        }
        if self.channel.drain_interval.is_zero()
            || self.stall.interval.is_zero()
            || self.watchdog.check_interval.is_zero()
        {
            return invalid("service intervals must be non-zero");
        }
        Ok(())
    }
}

/// Identity of this node in the fleet
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub hostname: String,
    pub service_name: String,
}

impl NodeConfig {
    pub fn node_id(&self) -> NodeId {
        NodeId::new(&self.hostname, &self.service_name)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        let hostname = std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".into());
        Self {
            hostname,
            service_name: "xferd".into(),
        }
    }
}

/// Heartbeat and fleet enumeration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Beat period
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Beacons this old or older are treated as dead
    #[serde(with = "humantime_serde")]
    pub staleness_window: Duration,
    /// The lead node deletes beacons older than this
    #[serde(with = "humantime_serde")]
    pub purge_after: Duration,
    /// Directory for the filesystem liveness store
    pub liveness_dir: PathBuf,
    /// Row count sharded by `TickSnapshot::shard`
    pub shard_rows: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            staleness_window: Duration::from_secs(120),
            purge_after: Duration::from_secs(600),
            liveness_dir: PathBuf::from("/var/lib/xferd/beacons"),
            shard_rows: 0,
        }
    }
}

/// Stall watchdog thresholds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    #[serde(with = "humantime_serde")]
    pub retrieve_threshold: Duration,
    #[serde(with = "humantime_serde")]
    pub update_threshold: Duration,
    #[serde(with = "humantime_serde")]
    pub stall_threshold: Duration,
    /// How often the marks are checked, independent of the heartbeat
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            retrieve_threshold: Duration::from_secs(300),
            update_threshold: Duration::from_secs(300),
            stall_threshold: Duration::from_secs(300),
            check_interval: Duration::from_secs(10),
        }
    }
}

/// Worker message channels
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Slots per message kind
    pub capacity: usize,
    /// Messages taken per kind per ingestion cycle
    pub max_drain_per_cycle: usize,
    #[serde(with = "humantime_serde")]
    pub drain_interval: Duration,
    /// Minimum gap between two "channel full" warnings of one kind
    #[serde(with = "humantime_serde")]
    pub full_warn_interval: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: 50_000,
            max_drain_per_cycle: 1_000,
            drain_interval: Duration::from_secs(1),
            full_warn_interval: Duration::from_secs(10),
        }
    }
}

/// Silent-transfer detection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StallConfig {
    /// A transfer with no report for this long is stalled
    #[serde(with = "humantime_serde")]
    pub transfer_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for StallConfig {
    fn default() -> Self {
        Self {
            transfer_timeout: Duration::from_secs(900),
            interval: Duration::from_secs(60),
        }
    }
}

/// Ordered shutdown
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// In-flight work gets this long to drain before shutdown is forced
    #[serde(with = "humantime_serde")]
    pub grace: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(30),
        }
    }
}

/// Tokio runtime hosting the services
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub worker_threads: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get().max(2),
        }
    }
}

/// Admission ladder selection
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BandConfig {
    pub mode: AdmissionMode,
    /// Replaces the built-in ladder when set
    pub rungs: Option<Vec<AdmissionBand>>,
}
