//! Message ingestion
//!
//! Drains the worker channels on a fixed cadence and hands each batch to
//! the data store sink. A successful cycle, empty or not, counts as
//! progress on the update path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::container::BackgroundService;
use super::stall::{StalledTransfer, TransferActivity};
use crate::config::ChannelConfig;
use crate::coordinator::CriticalPath;
use crate::error::Result;
use crate::metrics::standard;
use crate::protocol::{DrainedBatch, MessageConsumer};

/// Destination of drained worker messages
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn persist(&self, batch: DrainedBatch) -> Result<()>;

    async fn mark_stalled(&self, stalled: Vec<StalledTransfer>) -> Result<()>;
}

/// Sink that only logs, for nodes without a data store attached
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl MessageSink for TracingSink {
    async fn persist(&self, batch: DrainedBatch) -> Result<()> {
        for msg in &batch.status {
            info!(
                job_id = %msg.job_id,
                file_id = msg.file_id,
                status = %msg.status,
                message = %msg.message,
                "Transfer status"
            );
        }
        for msg in &batch.states {
            info!(
                job_id = %msg.job_id,
                file_id = msg.file_id,
                job_state = %msg.job_state,
                file_state = %msg.file_state,
                "State change"
            );
        }
        debug!(
            throughput = batch.throughput.len(),
            logs = batch.logs.len(),
            bring_online = batch.bring_online.len(),
            monitoring = batch.monitoring.len(),
            "Batch persisted"
        );
        Ok(())
    }

    async fn mark_stalled(&self, stalled: Vec<StalledTransfer>) -> Result<()> {
        for t in stalled {
            info!(job_id = %t.job_id, file_id = t.file_id, silent_secs = t.silent_for.as_secs(), "Transfer stalled");
        }
        Ok(())
    }
}

/// Per-kind sizes of a drained batch, for logging after it is consumed
#[derive(Debug, Clone, Copy)]
struct KindCounts {
    status: usize,
    throughput: usize,
    logs: usize,
    bring_online: usize,
    states: usize,
    monitoring: usize,
}

impl KindCounts {
    fn of(batch: &DrainedBatch) -> Self {
        Self {
            status: batch.status.len(),
            throughput: batch.throughput.len(),
            logs: batch.logs.len(),
            bring_online: batch.bring_online.len(),
            states: batch.states.len(),
            monitoring: batch.monitoring.len(),
        }
    }
}

pub struct IngestionService {
    consumer: Mutex<MessageConsumer>,
    sink: Arc<dyn MessageSink>,
    activity: Arc<TransferActivity>,
    max_per_kind: usize,
    interval: Duration,
}

impl IngestionService {
    pub fn new(
        consumer: MessageConsumer,
        sink: Arc<dyn MessageSink>,
        activity: Arc<TransferActivity>,
        config: &ChannelConfig,
    ) -> Self {
        Self {
            consumer: Mutex::new(consumer),
            sink,
            activity,
            max_per_kind: config.max_drain_per_cycle,
            interval: config.drain_interval,
        }
    }
}

#[async_trait]
impl BackgroundService for IngestionService {
    fn name(&self) -> &'static str {
        "ingestion"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn critical_path(&self) -> Option<CriticalPath> {
        Some(CriticalPath::Update)
    }

    async fn run_once(&self) -> Result<()> {
        let batch = self.consumer.lock().await.drain(self.max_per_kind);
        if batch.is_empty() {
            return Ok(());
        }
        let start = Instant::now();
        let count = batch.len();

        // A report proves the transfer alive even if persisting it fails
        self.activity.observe(&batch);
        let kinds = KindCounts::of(&batch);
        if let Err(e) = self.sink.persist(batch).await {
            standard::MESSAGES_DROPPED.add(count as u64);
            warn!(
                error = %e,
                dropped = count,
                status = kinds.status,
                throughput = kinds.throughput,
                logs = kinds.logs,
                bring_online = kinds.bring_online,
                states = kinds.states,
                monitoring = kinds.monitoring,
                "Persist failed, drained batch dropped"
            );
            return Err(e);
        }

        standard::MESSAGES_INGESTED.add(count as u64);
        standard::INGEST_DURATION.observe(start.elapsed().as_secs_f64());
        debug!(count, "Ingested worker messages");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{message_bus, JobId, TransferStatus};

    #[derive(Default)]
    struct Collect {
        batches: parking_lot::Mutex<Vec<usize>>,
        down: bool,
    }

    #[async_trait]
    impl MessageSink for Collect {
        async fn persist(&self, batch: DrainedBatch) -> Result<()> {
            if self.down {
                return Err(crate::error::XferdError::store("data store unreachable"));
            }
            self.batches.lock().push(batch.len());
            Ok(())
        }

        async fn mark_stalled(&self, _stalled: Vec<StalledTransfer>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_drains_into_sink() {
        let config = ChannelConfig {
            max_drain_per_cycle: 2,
            ..Default::default()
        };
        let (producer, consumer) = message_bus(&config).unwrap();
        let sink = Arc::new(Collect::default());
        let activity = Arc::new(TransferActivity::new());
        let service = IngestionService::new(consumer, sink.clone(), activity.clone(), &config);

        let job = JobId::generate();
        for file in 0..3 {
            producer.enqueue(TransferStatus::new(job, file, "ACTIVE")).unwrap();
        }
        service.run_once().await.unwrap();
        service.run_once().await.unwrap();
        service.run_once().await.unwrap();

        assert_eq!(*sink.batches.lock(), vec![2, 1]);
        assert_eq!(activity.tracked(), 3);
    }

    #[tokio::test]
    async fn test_persist_failure_surfaces_and_counts_drop() {
        let config = ChannelConfig::default();
        let (producer, consumer) = message_bus(&config).unwrap();
        let sink = Arc::new(Collect {
            down: true,
            ..Default::default()
        });
        let activity = Arc::new(TransferActivity::new());
        let service = IngestionService::new(consumer, sink.clone(), activity.clone(), &config);

        let job = JobId::generate();
        producer.enqueue(TransferStatus::new(job, 1, "ACTIVE")).unwrap();
        let dropped_before = standard::MESSAGES_DROPPED.get();

        assert!(service.run_once().await.is_err());
        assert!(standard::MESSAGES_DROPPED.get() >= dropped_before + 1);
        assert!(sink.batches.lock().is_empty());
        assert_eq!(activity.tracked(), 1);
    }
}
