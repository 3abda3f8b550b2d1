//! xferd core - fleet coordination for a file transfer scheduler
//!
//! This crate provides:
//! - Heartbeat liveness, derived leader election and job sharding
//! - A stall watchdog that fences a stuck node out of the fleet
//! - Fixed-shape worker to coordinator messages over bounded channels
//! - Discrete concurrency band tables consulted during dispatch

pub mod concurrency;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod protocol;
pub mod runtime;

pub use config::XferdConfig;
pub use error::{Result, XferdError};
pub use runtime::{ServiceContainer, ServiceRuntime};

/// Default heartbeat interval in seconds
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Default beacon staleness window in seconds
pub const DEFAULT_STALENESS_WINDOW_SECS: u64 = 120;

/// Default slots per message channel
pub const MAX_NUM_MSGS: usize = 50_000;
