//! Bounded worker to coordinator channels
//!
//! One bounded FIFO per [`MessageKind`]. Producers never block: a full
//! channel rejects the message with `QueueFull` and leaves the queued
//! slots untouched. Ordering holds within a kind, not across kinds.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, warn};

use super::bring_online::BringOnlineState;
use super::messages::{
    now_millis, LogLine, Message, MessageKind, MonitoringEvent, StateChange, ThroughputUpdate,
    TransferStatus,
};
use crate::config::ChannelConfig;
use crate::error::{Result, XferdError};
use crate::metrics::standard;

/// Emits at most one warning per interval and counts the rest
#[derive(Debug)]
pub struct RateLimitedWarn {
    interval_ms: i64,
    last_ms: AtomicI64,
    suppressed: AtomicU64,
}

impl RateLimitedWarn {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_ms: interval.as_millis() as i64,
            last_ms: AtomicI64::new(i64::MIN),
            suppressed: AtomicU64::new(0),
        }
    }

    /// Returns `Some(suppressed_since_last)` when a warning should be emitted
    pub fn check(&self, now_ms: i64) -> Option<u64> {
        let last = self.last_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last) >= self.interval_ms
            && self
                .last_ms
                .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
        {
            return Some(self.suppressed.swap(0, Ordering::Relaxed));
        }
        self.suppressed.fetch_add(1, Ordering::Relaxed);
        None
    }
}

struct ProducerShared {
    capacity: usize,
    full_warnings: [RateLimitedWarn; 6],
}

/// Create the per-kind channels for one coordinator
pub fn message_bus(config: &ChannelConfig) -> Result<(MessageProducer, MessageConsumer)> {
    if config.capacity == 0 {
        return Err(XferdError::InvalidConfig {
            reason: "channel capacity must be at least 1".into(),
        });
    }
    let cap = config.capacity;
    let (status_tx, status_rx) = mpsc::channel(cap);
    let (throughput_tx, throughput_rx) = mpsc::channel(cap);
    let (log_tx, log_rx) = mpsc::channel(cap);
    let (bring_online_tx, bring_online_rx) = mpsc::channel(cap);
    let (state_tx, state_rx) = mpsc::channel(cap);
    let (monitoring_tx, monitoring_rx) = mpsc::channel(cap);

    let shared = Arc::new(ProducerShared {
        capacity: cap,
        full_warnings: std::array::from_fn(|_| RateLimitedWarn::new(config.full_warn_interval)),
    });

    let producer = MessageProducer {
        status: status_tx,
        throughput: throughput_tx,
        log: log_tx,
        bring_online: bring_online_tx,
        state: state_tx,
        monitoring: monitoring_tx,
        shared,
    };
    let consumer = MessageConsumer {
        status: status_rx,
        throughput: throughput_rx,
        log: log_rx,
        bring_online: bring_online_rx,
        state: state_rx,
        monitoring: monitoring_rx,
    };
    Ok((producer, consumer))
}

/// Worker-side handle, clone one per worker
#[derive(Clone)]
pub struct MessageProducer {
    status: mpsc::Sender<TransferStatus>,
    throughput: mpsc::Sender<ThroughputUpdate>,
    log: mpsc::Sender<LogLine>,
    bring_online: mpsc::Sender<BringOnlineState>,
    state: mpsc::Sender<StateChange>,
    monitoring: mpsc::Sender<MonitoringEvent>,
    shared: Arc<ProducerShared>,
}

impl MessageProducer {
    /// Enqueue without blocking.
    ///
    /// Fails with `QueueFull` when the kind's channel is at capacity; the
    /// caller decides whether to back off and retry or drop the message.
    pub fn enqueue(&self, message: impl Into<Message>) -> Result<()> {
        let message = message.into();
        let kind = message.kind();
        let sent = match message {
            Message::Status(m) => self.status.try_send(m).map_err(discard),
            Message::Throughput(m) => self.throughput.try_send(m).map_err(discard),
            Message::Log(m) => self.log.try_send(m).map_err(discard),
            Message::BringOnline(m) => self.bring_online.try_send(m).map_err(discard),
            Message::State(m) => self.state.try_send(m).map_err(discard),
            Message::Monitoring(m) => self.monitoring.try_send(m).map_err(discard),
        };

        match sent {
            Ok(()) => {
                standard::MESSAGES_ENQUEUED.inc();
                Ok(())
            }
            Err(TrySendError::Full(())) => {
                standard::MESSAGES_REJECTED.inc();
                let limiter = &self.shared.full_warnings[kind.index()];
                if let Some(suppressed) = limiter.check(now_millis()) {
                    warn!(
                        kind = %kind,
                        capacity = self.shared.capacity,
                        suppressed,
                        "Message channel full, dropping or deferring messages"
                    );
                }
                Err(XferdError::QueueFull {
                    kind,
                    capacity: self.shared.capacity,
                })
            }
            Err(TrySendError::Closed(())) => Err(XferdError::QueueClosed { kind }),
        }
    }

    /// Enqueue, retrying with doubling backoff while the channel is full.
    ///
    /// Gives up after `attempts` tries and returns the last `QueueFull`.
    pub async fn enqueue_with_backoff(
        &self,
        message: impl Into<Message>,
        attempts: u32,
        initial_delay: Duration,
    ) -> Result<()> {
        let message = message.into();
        let mut delay = initial_delay;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.enqueue(message.clone()) {
                Err(err @ XferdError::QueueFull { .. }) if attempt >= attempts => return Err(err),
                Err(XferdError::QueueFull { .. }) => {
                    debug!(attempt, ?delay, "Channel full, backing off");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                other => return other,
            }
        }
    }

    /// Slot count of each channel
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

fn discard<T>(err: TrySendError<T>) -> TrySendError<()> {
    match err {
        TrySendError::Full(_) => TrySendError::Full(()),
        TrySendError::Closed(_) => TrySendError::Closed(()),
    }
}

/// Messages drained in one ingestion cycle, FIFO within each kind
#[derive(Debug, Default)]
pub struct DrainedBatch {
    pub status: Vec<TransferStatus>,
    pub throughput: Vec<ThroughputUpdate>,
    pub logs: Vec<LogLine>,
    pub bring_online: Vec<BringOnlineState>,
    pub states: Vec<StateChange>,
    pub monitoring: Vec<MonitoringEvent>,
}

impl DrainedBatch {
    pub fn len(&self) -> usize {
        self.status.len()
            + self.throughput.len()
            + self.logs.len()
            + self.bring_online.len()
            + self.states.len()
            + self.monitoring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Coordinator-side handle
pub struct MessageConsumer {
    status: mpsc::Receiver<TransferStatus>,
    throughput: mpsc::Receiver<ThroughputUpdate>,
    log: mpsc::Receiver<LogLine>,
    bring_online: mpsc::Receiver<BringOnlineState>,
    state: mpsc::Receiver<StateChange>,
    monitoring: mpsc::Receiver<MonitoringEvent>,
}

impl MessageConsumer {
    /// Take up to `max_per_kind` queued messages from every channel
    pub fn drain(&mut self, max_per_kind: usize) -> DrainedBatch {
        DrainedBatch {
            status: drain_one(&mut self.status, max_per_kind),
            throughput: drain_one(&mut self.throughput, max_per_kind),
            logs: drain_one(&mut self.log, max_per_kind),
            bring_online: drain_one(&mut self.bring_online, max_per_kind),
            states: drain_one(&mut self.state, max_per_kind),
            monitoring: drain_one(&mut self.monitoring, max_per_kind),
        }
    }

    /// Queued messages of one kind
    pub fn pending(&self, kind: MessageKind) -> usize {
        match kind {
            MessageKind::Status => self.status.len(),
            MessageKind::Throughput => self.throughput.len(),
            MessageKind::Log => self.log.len(),
            MessageKind::BringOnline => self.bring_online.len(),
            MessageKind::State => self.state.len(),
            MessageKind::Monitoring => self.monitoring.len(),
        }
    }
}

fn drain_one<T>(rx: &mut mpsc::Receiver<T>, max: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(max.min(rx.len()));
    while out.len() < max {
        match rx.try_recv() {
            Ok(item) => out.push(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
    out
}
