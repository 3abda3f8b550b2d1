//! Silent transfer detection
//!
//! Tracks when each running transfer last reported. A transfer that stays
//! silent past the configured timeout is handed to the sink as stalled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, warn};

use super::container::BackgroundService;
use super::ingest::MessageSink;
use crate::config::StallConfig;
use crate::coordinator::CriticalPath;
use crate::error::Result;
use crate::metrics::standard;
use crate::protocol::messages::{now_millis, status};
use crate::protocol::{DrainedBatch, JobId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalledTransfer {
    pub job_id: JobId,
    pub file_id: u64,
    pub silent_for: Duration,
    /// Report time the stall was judged against, milliseconds since epoch
    pub last_seen_ms: i64,
}

/// Last report time per `(job, file)`, milliseconds since epoch
#[derive(Default)]
pub struct TransferActivity {
    last_seen: Mutex<HashMap<(JobId, u64), i64>>,
}

impl TransferActivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, batch: &DrainedBatch) {
        self.observe_at(batch, now_millis());
    }

    /// Record activity from one drained batch. Terminal statuses stop
    /// tracking the transfer.
    pub fn observe_at(&self, batch: &DrainedBatch, now_ms: i64) {
        let mut seen = self.last_seen.lock();
        for msg in &batch.status {
            let key = (msg.job_id, msg.file_id);
            if status::is_terminal(msg.status.as_str()) {
                seen.remove(&key);
            } else {
                seen.insert(key, now_ms);
            }
        }
        for msg in &batch.throughput {
            if let Some(last) = seen.get_mut(&(msg.job_id, msg.file_id)) {
                *last = now_ms;
            }
        }
    }

    pub fn tracked(&self) -> usize {
        self.last_seen.lock().len()
    }

    /// Transfers silent for longer than `timeout`. Tracking is left as is
    /// until the caller has recorded them.
    pub fn find_stalled(&self, now_ms: i64, timeout: Duration) -> Vec<StalledTransfer> {
        let limit = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        self.last_seen
            .lock()
            .iter()
            .filter_map(|(&(job_id, file_id), &last)| {
                let silent = now_ms - last;
                (silent > limit).then(|| StalledTransfer {
                    job_id,
                    file_id,
                    silent_for: Duration::from_millis(silent.max(0) as u64),
                    last_seen_ms: last,
                })
            })
            .collect()
    }

    /// Stop tracking recorded stalls. A transfer that reported again since
    /// it was judged stalled stays tracked.
    pub fn forget(&self, stalled: &[StalledTransfer]) {
        let mut seen = self.last_seen.lock();
        for t in stalled {
            let key = (t.job_id, t.file_id);
            if seen.get(&key) == Some(&t.last_seen_ms) {
                seen.remove(&key);
            }
        }
    }
}

pub struct StallCheckService {
    activity: Arc<TransferActivity>,
    sink: Arc<dyn MessageSink>,
    timeout: Duration,
    interval: Duration,
}

impl StallCheckService {
    pub fn new(activity: Arc<TransferActivity>, sink: Arc<dyn MessageSink>, config: &StallConfig) -> Self {
        Self {
            activity,
            sink,
            timeout: config.transfer_timeout,
            interval: config.interval,
        }
    }
}

#[async_trait]
impl BackgroundService for StallCheckService {
    fn name(&self) -> &'static str {
        "stall-check"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn critical_path(&self) -> Option<CriticalPath> {
        Some(CriticalPath::Stall)
    }

    async fn run_once(&self) -> Result<()> {
        let stalled = self.activity.find_stalled(now_millis(), self.timeout);
        if stalled.is_empty() {
            return Ok(());
        }
        info!(count = stalled.len(), "Transfers stalled");
        // Kept tracked on failure so the next cycle reports them again
        if let Err(e) = self.sink.mark_stalled(stalled.clone()).await {
            warn!(error = %e, count = stalled.len(), "Could not record stalled transfers");
            return Err(e);
        }
        self.activity.forget(&stalled);
        standard::STALLED_TRANSFERS.add(stalled.len() as u64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::error::XferdError;
    use crate::protocol::{ThroughputUpdate, TransferStatus};

    fn batch_with(status_msgs: Vec<TransferStatus>) -> DrainedBatch {
        DrainedBatch {
            status: status_msgs,
            ..Default::default()
        }
    }

    #[derive(Default)]
    struct FlakySink {
        down: AtomicBool,
        marked: parking_lot::Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl MessageSink for FlakySink {
        async fn persist(&self, _batch: DrainedBatch) -> Result<()> {
            Ok(())
        }

        async fn mark_stalled(&self, stalled: Vec<StalledTransfer>) -> Result<()> {
            if self.down.load(Ordering::SeqCst) {
                return Err(XferdError::store("data store unreachable"));
            }
            self.marked.lock().extend(stalled.iter().map(|t| t.file_id));
            Ok(())
        }
    }

    #[test]
    fn test_silent_transfer_reported_once() {
        let activity = TransferActivity::new();
        let job = JobId::generate();
        activity.observe_at(&batch_with(vec![TransferStatus::new(job, 1, status::ACTIVE)]), 0);

        let timeout = Duration::from_secs(900);
        assert!(activity.find_stalled(900_000, timeout).is_empty());
        let stalled = activity.find_stalled(900_001, timeout);
        assert_eq!(stalled.len(), 1);
        assert_eq!(stalled[0].file_id, 1);
        assert_eq!(activity.tracked(), 1);

        activity.forget(&stalled);
        assert!(activity.find_stalled(2_000_000, timeout).is_empty());
    }

    #[test]
    fn test_forget_keeps_transfer_that_reported_again() {
        let activity = TransferActivity::new();
        let job = JobId::generate();
        activity.observe_at(&batch_with(vec![TransferStatus::new(job, 1, status::ACTIVE)]), 0);
        let stalled = activity.find_stalled(10_000, Duration::from_secs(1));

        activity.observe_at(&batch_with(vec![TransferStatus::new(job, 1, status::ACTIVE)]), 10_500);
        activity.forget(&stalled);
        assert_eq!(activity.tracked(), 1);
    }

    #[tokio::test]
    async fn test_sink_failure_keeps_stall_for_next_cycle() {
        let activity = Arc::new(TransferActivity::new());
        let job = JobId::generate();
        activity.observe_at(&batch_with(vec![TransferStatus::new(job, 7, status::ACTIVE)]), 0);

        let sink = Arc::new(FlakySink::default());
        sink.down.store(true, Ordering::SeqCst);
        let service = StallCheckService::new(
            activity.clone(),
            sink.clone(),
            &StallConfig {
                transfer_timeout: Duration::from_secs(1),
                ..Default::default()
            },
        );

        assert!(service.run_once().await.is_err());
        assert_eq!(activity.tracked(), 1);

        sink.down.store(false, Ordering::SeqCst);
        service.run_once().await.unwrap();
        assert_eq!(*sink.marked.lock(), vec![7]);
        assert_eq!(activity.tracked(), 0);
    }

    #[test]
    fn test_throughput_refreshes_and_terminal_clears() {
        let activity = TransferActivity::new();
        let job = JobId::generate();
        activity.observe_at(&batch_with(vec![TransferStatus::new(job, 1, status::ACTIVE)]), 0);
        activity.observe_at(
            &DrainedBatch {
                throughput: vec![ThroughputUpdate::new(job, 1, 512.0, 4096)],
                ..Default::default()
            },
            800_000,
        );
        assert!(activity.find_stalled(1_000_000, Duration::from_secs(900)).is_empty());

        activity.observe_at(&batch_with(vec![TransferStatus::new(job, 1, status::FINISHED)]), 1_000_000);
        assert_eq!(activity.tracked(), 0);
    }
}
