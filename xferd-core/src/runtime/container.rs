//! Service container
//!
//! Hosts the periodic background services of one node. Each service runs
//! on its own task and never blocks another; a successful cycle of a
//! service bound to a critical path touches that path's timestamp.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::dispatch::{DispatchService, Dispatcher};
use super::ingest::{IngestionService, MessageSink};
use super::shutdown::{OrderedShutdown, ShutdownOutcome};
use super::stall::{StallCheckService, TransferActivity};
use crate::concurrency::ConcurrencyBands;
use crate::config::XferdConfig;
use crate::coordinator::{
    CriticalPath, CriticalTimestamps, Heartbeat, HeartbeatService, LivenessStore, StallWatchdog,
    WatchdogService,
};
use crate::error::Result;
use crate::protocol::{message_bus, MessageProducer};

/// A periodic unit of background work
#[async_trait]
pub trait BackgroundService: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    /// Path touched after every successful cycle
    fn critical_path(&self) -> Option<CriticalPath> {
        None
    }

    async fn run_once(&self) -> Result<()>;

    /// Runs once after in-flight work has drained
    async fn on_shutdown(&self) {}
}

/// Handles a caller keeps after assembling a node
#[derive(Clone)]
pub struct NodeHandles {
    pub producer: MessageProducer,
    pub heartbeat: Arc<Heartbeat>,
    pub watchdog: Arc<StallWatchdog>,
    pub timestamps: Arc<CriticalTimestamps>,
    pub shutdown: OrderedShutdown,
    pub bands: Arc<ConcurrencyBands>,
}

pub struct ServiceContainer {
    services: Vec<Arc<dyn BackgroundService>>,
    timestamps: Arc<CriticalTimestamps>,
    shutdown: OrderedShutdown,
}

impl ServiceContainer {
    pub fn new(timestamps: Arc<CriticalTimestamps>, shutdown: OrderedShutdown) -> Self {
        Self {
            services: Vec::new(),
            timestamps,
            shutdown,
        }
    }

    /// Wire every service of a node from its configuration
    pub fn assemble<D: Dispatcher>(
        config: &XferdConfig,
        store: Arc<dyn LivenessStore>,
        sink: Arc<dyn MessageSink>,
        dispatcher: D,
    ) -> Result<(Self, NodeHandles)> {
        config.validate()?;

        let shutdown = OrderedShutdown::new(config.shutdown.grace);
        let timestamps = Arc::new(CriticalTimestamps::new());
        let bands = Arc::new(ConcurrencyBands::from_config(&config.bands)?);
        let (producer, consumer) = message_bus(&config.channel)?;

        let heartbeat = Arc::new(Heartbeat::new(
            config.node.node_id(),
            store,
            config.heartbeat.clone(),
        ));
        let watchdog = Arc::new(StallWatchdog::new(
            timestamps.clone(),
            &config.watchdog,
            shutdown.clone(),
        ));
        let activity = Arc::new(TransferActivity::new());

        let mut container = Self::new(timestamps.clone(), shutdown.clone());
        container.register(HeartbeatService::new(heartbeat.clone()));
        container.register(WatchdogService::new(watchdog.clone(), &config.watchdog));
        container.register(IngestionService::new(
            consumer,
            sink.clone(),
            activity.clone(),
            &config.channel,
        ));
        container.register(StallCheckService::new(activity, sink, &config.stall));
        container.register(DispatchService::new(
            dispatcher,
            heartbeat.subscribe(),
            bands.clone(),
            config.heartbeat.interval,
        ));

        let handles = NodeHandles {
            producer,
            heartbeat,
            watchdog,
            timestamps,
            shutdown,
            bands,
        };
        Ok((container, handles))
    }

    pub fn register(&mut self, service: impl BackgroundService) {
        self.services.push(Arc::new(service));
    }

    pub fn shutdown(&self) -> &OrderedShutdown {
        &self.shutdown
    }

    /// Run every service until shutdown is initiated, then drain
    pub async fn run(self) -> ShutdownOutcome {
        info!(services = self.services.len(), "Starting services");
        let handles: Vec<JoinHandle<()>> = self
            .services
            .iter()
            .map(|svc| {
                tokio::spawn(service_loop(
                    svc.clone(),
                    self.timestamps.clone(),
                    self.shutdown.clone(),
                ))
            })
            .collect();

        self.shutdown.wait().await;
        let outcome = self.shutdown.drain().await;

        for svc in &self.services {
            if tokio::time::timeout(self.shutdown.grace(), svc.on_shutdown())
                .await
                .is_err()
            {
                warn!(service = svc.name(), "Shutdown hook timed out");
            }
        }
        for handle in handles {
            handle.abort();
        }
        info!(?outcome, reason = ?self.shutdown.reason(), "Services stopped");
        outcome
    }
}

async fn service_loop(
    svc: Arc<dyn BackgroundService>,
    timestamps: Arc<CriticalTimestamps>,
    shutdown: OrderedShutdown,
) {
    let mut stop = shutdown.subscribe();
    let mut ticker = tokio::time::interval(svc.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.recv() => break,
            _ = ticker.tick() => {}
        }
        let Ok(_guard) = shutdown.track() else {
            break;
        };
        match svc.run_once().await {
            Ok(()) => {
                if let Some(path) = svc.critical_path() {
                    timestamps.touch(path);
                }
            }
            Err(e) if e.is_fatal() => {
                error!(service = svc.name(), error = %e, "Fatal service error");
                shutdown.initiate(e);
                break;
            }
            Err(e) => warn!(service = svc.name(), error = %e, "Service cycle failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        runs: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl BackgroundService for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn interval(&self) -> Duration {
            Duration::from_millis(10)
        }

        fn critical_path(&self) -> Option<CriticalPath> {
            Some(CriticalPath::Retrieve)
        }

        async fn run_once(&self) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(crate::error::XferdError::store("unreachable"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_success_touches_critical_path() {
        let timestamps = Arc::new(CriticalTimestamps::starting_at(0));
        let shutdown = OrderedShutdown::new(Duration::from_secs(1));
        let runs = Arc::new(AtomicUsize::new(0));
        let mut container = ServiceContainer::new(timestamps.clone(), shutdown.clone());
        container.register(Counting {
            runs: runs.clone(),
            fail: false,
        });

        let task = tokio::spawn(container.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.initiate("test");

        assert_eq!(task.await.unwrap(), ShutdownOutcome::Clean);
        assert!(runs.load(Ordering::SeqCst) >= 1);
        assert!(timestamps.last(CriticalPath::Retrieve) > 0);
    }

    #[tokio::test]
    async fn test_failure_does_not_touch() {
        let timestamps = Arc::new(CriticalTimestamps::starting_at(0));
        let shutdown = OrderedShutdown::new(Duration::from_secs(1));
        let runs = Arc::new(AtomicUsize::new(0));
        let mut container = ServiceContainer::new(timestamps.clone(), shutdown.clone());
        container.register(Counting {
            runs: runs.clone(),
            fail: true,
        });

        let task = tokio::spawn(container.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.initiate("test");
        task.await.unwrap();

        assert!(runs.load(Ordering::SeqCst) >= 1);
        assert_eq!(timestamps.last(CriticalPath::Retrieve), 0);
    }
}
