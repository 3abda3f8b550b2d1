//! Tokio runtime hosting the node services

use std::future::Future;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::config::RuntimeConfig;
use crate::error::{Result, XferdError};

/// Multi-threaded runtime for heartbeat, ingestion and dispatch tasks
pub struct ServiceRuntime {
    runtime: Runtime,
}

impl ServiceRuntime {
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name("xferd-svc")
            .enable_all()
            .build()
            .map_err(|e| XferdError::Internal {
                message: format!("Failed to create service runtime: {}", e),
            })?;
        Ok(Self { runtime })
    }

    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(future)
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    /// Drop remaining tasks, waiting at most `timeout` for blocking work
    pub fn shutdown(self, timeout: Duration) {
        self.runtime.shutdown_timeout(timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_creation() {
        let runtime = ServiceRuntime::new(&RuntimeConfig { worker_threads: 2 }).unwrap();
        let result = runtime.block_on(async { 42 });
        assert_eq!(result, 42);
        runtime.shutdown(Duration::from_secs(1));
    }
}
