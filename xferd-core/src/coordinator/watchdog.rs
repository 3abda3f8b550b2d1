//! Stall watchdog
//!
//! Three critical-path timestamps, each touched by the background service
//! it tracks after every successful cycle. The watchdog only reads them.
//! When any mark grows older than its threshold the node fences itself
//! off through ordered shutdown, exactly once per process.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::error;

use crate::config::WatchdogConfig;
use crate::error::{Result, XferdError};
use crate::metrics::standard;
use crate::runtime::container::BackgroundService;
use crate::runtime::shutdown::OrderedShutdown;

/// Background path whose progress is watched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CriticalPath {
    /// Job record retrieval
    Retrieve,
    /// Record update / message ingestion
    Update,
    /// Stall-check cycle
    Stall,
}

impl CriticalPath {
    pub const ALL: [CriticalPath; 3] = [CriticalPath::Retrieve, CriticalPath::Update, CriticalPath::Stall];

    pub fn as_str(&self) -> &'static str {
        match self {
            CriticalPath::Retrieve => "retrieve",
            CriticalPath::Update => "update",
            CriticalPath::Stall => "stall",
        }
    }
}

impl fmt::Display for CriticalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last-progress marks, unix seconds
#[derive(Debug)]
pub struct CriticalTimestamps {
    retrieve: AtomicI64,
    update: AtomicI64,
    stall: AtomicI64,
}

impl CriticalTimestamps {
    /// All marks start at process start
    pub fn new() -> Self {
        Self::starting_at(Utc::now().timestamp())
    }

    pub fn starting_at(now: i64) -> Self {
        Self {
            retrieve: AtomicI64::new(now),
            update: AtomicI64::new(now),
            stall: AtomicI64::new(now),
        }
    }

    fn slot(&self, path: CriticalPath) -> &AtomicI64 {
        match path {
            CriticalPath::Retrieve => &self.retrieve,
            CriticalPath::Update => &self.update,
            CriticalPath::Stall => &self.stall,
        }
    }

    pub fn touch(&self, path: CriticalPath) {
        self.touch_at(path, Utc::now().timestamp());
    }

    pub fn touch_at(&self, path: CriticalPath, now: i64) {
        self.slot(path).store(now, Ordering::Release);
    }

    pub fn touch_retrieve(&self) {
        self.touch(CriticalPath::Retrieve);
    }

    pub fn touch_update(&self) {
        self.touch(CriticalPath::Update);
    }

    pub fn touch_stall(&self) {
        self.touch(CriticalPath::Stall);
    }

    pub fn last(&self, path: CriticalPath) -> i64 {
        self.slot(path).load(Ordering::Acquire)
    }
}

impl Default for CriticalTimestamps {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Healthy,
    /// Terminal for this process
    ShuttingDown,
}

/// A mark that exceeded its threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired {
    pub path: CriticalPath,
    pub age_secs: i64,
    pub threshold_secs: i64,
}

impl From<Expired> for XferdError {
    fn from(e: Expired) -> Self {
        XferdError::WatchdogTripped {
            path: e.path,
            age_secs: e.age_secs,
            threshold_secs: e.threshold_secs,
        }
    }
}

pub struct StallWatchdog {
    timestamps: Arc<CriticalTimestamps>,
    thresholds: [i64; 3],
    tripped: AtomicBool,
    shutdown: OrderedShutdown,
}

impl StallWatchdog {
    pub fn new(
        timestamps: Arc<CriticalTimestamps>,
        config: &WatchdogConfig,
        shutdown: OrderedShutdown,
    ) -> Self {
        let secs = |d: std::time::Duration| i64::try_from(d.as_secs()).unwrap_or(i64::MAX);
        Self {
            timestamps,
            thresholds: [
                secs(config.retrieve_threshold),
                secs(config.update_threshold),
                secs(config.stall_threshold),
            ],
            tripped: AtomicBool::new(false),
            shutdown,
        }
    }

    pub fn timestamps(&self) -> &Arc<CriticalTimestamps> {
        &self.timestamps
    }

    fn threshold(&self, path: CriticalPath) -> i64 {
        match path {
            CriticalPath::Retrieve => self.thresholds[0],
            CriticalPath::Update => self.thresholds[1],
            CriticalPath::Stall => self.thresholds[2],
        }
    }

    /// First mark older than its threshold at `now`, without side effects
    pub fn critical_thread_expired(&self, now: i64) -> Option<Expired> {
        CriticalPath::ALL.into_iter().find_map(|path| {
            let age_secs = now - self.timestamps.last(path);
            let threshold_secs = self.threshold(path);
            (age_secs > threshold_secs).then_some(Expired {
                path,
                age_secs,
                threshold_secs,
            })
        })
    }

    pub fn check(&self) -> WatchdogState {
        self.check_at(Utc::now().timestamp())
    }

    /// Trip into ordered shutdown if a mark expired. Repeated checks after
    /// the trip do nothing.
    pub fn check_at(&self, now: i64) -> WatchdogState {
        if self.tripped.load(Ordering::Acquire) {
            return WatchdogState::ShuttingDown;
        }
        let Some(expired) = self.critical_thread_expired(now) else {
            return WatchdogState::Healthy;
        };
        if self
            .tripped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            standard::WATCHDOG_TRIPS.inc();
            let err = XferdError::from(expired);
            error!(
                path = %expired.path,
                age_secs = expired.age_secs,
                threshold_secs = expired.threshold_secs,
                "Critical path stalled, shutting down node"
            );
            self.shutdown.initiate(err);
        }
        WatchdogState::ShuttingDown
    }

    pub fn state(&self) -> WatchdogState {
        if self.tripped.load(Ordering::Acquire) {
            WatchdogState::ShuttingDown
        } else {
            WatchdogState::Healthy
        }
    }
}

/// Watchdog check on its own task. It shares nothing with the heartbeat
/// loop, so a hung liveness store cannot hold it back.
pub struct WatchdogService {
    watchdog: Arc<StallWatchdog>,
    interval: Duration,
}

impl WatchdogService {
    pub fn new(watchdog: Arc<StallWatchdog>, config: &WatchdogConfig) -> Self {
        Self {
            watchdog,
            interval: config.check_interval,
        }
    }
}

#[async_trait]
impl BackgroundService for WatchdogService {
    fn name(&self) -> &'static str {
        "watchdog"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self) -> Result<()> {
        self.watchdog.check();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watchdog(start: i64) -> (StallWatchdog, OrderedShutdown) {
        let shutdown = OrderedShutdown::new(Duration::from_secs(1));
        let wd = StallWatchdog::new(
            Arc::new(CriticalTimestamps::starting_at(start)),
            &WatchdogConfig::default(),
            shutdown.clone(),
        );
        (wd, shutdown)
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let (wd, _) = watchdog(0);
        assert!(wd.critical_thread_expired(300).is_none());
        let expired = wd.critical_thread_expired(301).unwrap();
        assert_eq!(expired.path, CriticalPath::Retrieve);
        assert_eq!(expired.age_secs, 301);
    }

    #[test]
    fn test_touch_keeps_healthy() {
        let (wd, shutdown) = watchdog(0);
        for path in CriticalPath::ALL {
            wd.timestamps().touch_at(path, 250);
        }
        assert_eq!(wd.check_at(400), WatchdogState::Healthy);
        assert!(!shutdown.is_shutting_down());
    }

    #[test]
    fn test_reports_the_lagging_path() {
        let (wd, _) = watchdog(0);
        wd.timestamps().touch_at(CriticalPath::Retrieve, 500);
        wd.timestamps().touch_at(CriticalPath::Stall, 500);
        let expired = wd.critical_thread_expired(600).unwrap();
        assert_eq!(expired.path, CriticalPath::Update);
    }

    #[tokio::test]
    async fn test_trips_once() {
        let (wd, shutdown) = watchdog(0);
        let mut rx = shutdown.subscribe();

        assert_eq!(wd.check_at(301), WatchdogState::ShuttingDown);
        assert_eq!(wd.check_at(302), WatchdogState::ShuttingDown);
        assert_eq!(wd.check_at(900), WatchdogState::ShuttingDown);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert!(shutdown.reason().unwrap().contains("retrieve"));
    }
}
