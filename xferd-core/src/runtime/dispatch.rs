//! Dispatch cycle
//!
//! Hands the latest tick snapshot and the band tables to an external
//! dispatcher, which retrieves the jobs this node owns and decides how
//! much to admit per link. A successful cycle counts as retrieval progress.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use super::container::BackgroundService;
use crate::concurrency::ConcurrencyBands;
use crate::coordinator::{CriticalPath, Leadership, TickSnapshot};
use crate::error::Result;

/// Inputs of one dispatch cycle
pub struct DispatchContext<'a> {
    pub snapshot: Arc<TickSnapshot>,
    pub bands: &'a ConcurrencyBands,
}

/// Job scheduling logic living outside this crate
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    async fn dispatch(&self, ctx: &DispatchContext<'_>) -> Result<()>;
}

/// Dispatcher that schedules nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct IdleDispatcher;

#[async_trait]
impl Dispatcher for IdleDispatcher {
    async fn dispatch(&self, ctx: &DispatchContext<'_>) -> Result<()> {
        debug!(shard = ?ctx.snapshot.hash_shard, "Idle dispatch cycle");
        Ok(())
    }
}

pub struct DispatchService<D> {
    dispatcher: D,
    snapshots: watch::Receiver<Arc<TickSnapshot>>,
    bands: Arc<ConcurrencyBands>,
    interval: Duration,
}

impl<D: Dispatcher> DispatchService<D> {
    pub fn new(
        dispatcher: D,
        snapshots: watch::Receiver<Arc<TickSnapshot>>,
        bands: Arc<ConcurrencyBands>,
        interval: Duration,
    ) -> Self {
        Self {
            dispatcher,
            snapshots,
            bands,
            interval,
        }
    }
}

#[async_trait]
impl<D: Dispatcher> BackgroundService for DispatchService<D> {
    fn name(&self) -> &'static str {
        "dispatch"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn critical_path(&self) -> Option<CriticalPath> {
        Some(CriticalPath::Retrieve)
    }

    async fn run_once(&self) -> Result<()> {
        let snapshot = self.snapshots.borrow().clone();
        // No shard to work on until the first successful fleet read
        if snapshot.leadership == Leadership::Unknown {
            return Ok(());
        }
        let ctx = DispatchContext {
            snapshot,
            bands: &self.bands,
        };
        self.dispatcher.dispatch(&ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recording {
        seen: Arc<Mutex<Vec<u32>>>,
    }

    #[async_trait]
    impl Dispatcher for Recording {
        async fn dispatch(&self, ctx: &DispatchContext<'_>) -> Result<()> {
            self.seen.lock().push(ctx.bands.admit(3).jobs);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_skips_until_fleet_known() {
        let (tx, rx) = watch::channel(Arc::new(TickSnapshot::unknown(Utc::now())));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let service = DispatchService::new(
            Recording { seen: seen.clone() },
            rx,
            Arc::new(ConcurrencyBands::standard()),
            Duration::from_secs(1),
        );

        service.run_once().await.unwrap();
        assert!(seen.lock().is_empty());

        let mut known = TickSnapshot::unknown(Utc::now());
        known.leadership = Leadership::Lead;
        tx.send_replace(Arc::new(known));
        service.run_once().await.unwrap();
        assert_eq!(*seen.lock(), vec![3]);
    }
}
