//! Ordered shutdown
//!
//! Broadcast-based stop signal plus an in-flight counter. Once initiated,
//! services stop taking new work, in-flight work gets a bounded grace
//! period to drain, then the process exits whether or not it drained.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};
use tracing::{info, warn};

use crate::error::{Result, XferdError};

/// How the drain ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// All in-flight work finished within the grace period
    Clean,
    /// Grace period elapsed with work still running
    Forced,
}

impl ShutdownOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownOutcome::Clean => 0,
            ShutdownOutcome::Forced => 1,
        }
    }
}

struct Inner {
    sender: broadcast::Sender<()>,
    initiated: AtomicBool,
    in_flight: AtomicUsize,
    drained: Notify,
    grace: Duration,
    reason: Mutex<Option<String>>,
}

/// Cloneable shutdown handle shared by every service of a node
#[derive(Clone)]
pub struct OrderedShutdown {
    inner: Arc<Inner>,
}

impl OrderedShutdown {
    pub fn new(grace: Duration) -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(Inner {
                sender,
                initiated: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                drained: Notify::new(),
                grace,
                reason: Mutex::new(None),
            }),
        }
    }

    /// Begin shutdown. Only the first call has any effect and returns true.
    pub fn initiate(&self, reason: impl fmt::Display) -> bool {
        if self
            .inner
            .initiated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let reason = reason.to_string();
        info!(reason = %reason, in_flight = self.in_flight(), "Ordered shutdown initiated");
        *self.inner.reason.lock() = Some(reason);
        let _ = self.inner.sender.send(());
        true
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.initiated.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<String> {
        self.inner.reason.lock().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.inner.sender.subscribe()
    }

    /// Resolves once shutdown has been initiated
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        if self.is_shutting_down() {
            return;
        }
        let _ = rx.recv().await;
    }

    /// Register one unit of in-flight work; refused once shutting down
    pub fn track(&self) -> Result<InFlightGuard> {
        if self.is_shutting_down() {
            return Err(XferdError::ShutdownInProgress);
        }
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        Ok(InFlightGuard {
            inner: self.inner.clone(),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    pub fn grace(&self) -> Duration {
        self.inner.grace
    }

    /// Wait up to the grace period for in-flight work to finish
    pub async fn drain(&self) -> ShutdownOutcome {
        let idle = async {
            loop {
                let notified = self.inner.drained.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.in_flight() == 0 {
                    return;
                }
                notified.await;
            }
        };

        match tokio::time::timeout(self.inner.grace, idle).await {
            Ok(()) => {
                info!("In-flight work drained");
                ShutdownOutcome::Clean
            }
            Err(_) => {
                warn!(
                    remaining = self.in_flight(),
                    grace_secs = self.inner.grace.as_secs(),
                    "Grace period elapsed, forcing shutdown"
                );
                ShutdownOutcome::Forced
            }
        }
    }
}

/// Decrements the in-flight count when dropped
pub struct InFlightGuard {
    inner: Arc<Inner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}
