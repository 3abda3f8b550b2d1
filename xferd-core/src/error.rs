//! Error types for xferd
//!
//! Error taxonomy covering the liveness store, the worker message
//! channels, the stall watchdog and configuration.

use thiserror::Error;

use crate::coordinator::watchdog::CriticalPath;
use crate::protocol::MessageKind;

/// Primary error type for all xferd operations
#[derive(Debug, Error)]
pub enum XferdError {
    // ========== Liveness Errors ==========

    /// Liveness store or data store temporarily unreachable
    #[error("Store temporarily unavailable: {message}")]
    TransientStore { message: String },

    /// A beacon record could not be decoded
    #[error("Corrupt beacon record {key}: {reason}")]
    CorruptBeacon { key: String, reason: String },

    // ========== Messaging Errors ==========

    /// Message channel at capacity
    #[error("{kind} channel full ({capacity} slots)")]
    QueueFull { kind: MessageKind, capacity: usize },

    /// Every consumer of the channel is gone
    #[error("{kind} channel closed")]
    QueueClosed { kind: MessageKind },

    /// Message failed validation or decoding
    #[error("Invalid message: {reason}")]
    InvalidMessage { reason: String },

    // ========== Watchdog Errors ==========

    /// A critical background path stopped making progress
    #[error("Watchdog tripped: {path} idle for {age_secs}s (threshold {threshold_secs}s)")]
    WatchdogTripped {
        path: CriticalPath,
        age_secs: i64,
        threshold_secs: i64,
    },

    // ========== Configuration Errors ==========

    /// Configuration rejected by validation
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Admission band table rejected by validation
    #[error("Invalid admission band: {reason}")]
    InvalidBand { reason: String },

    /// TOML parse failure
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // ========== Runtime Errors ==========

    /// Shutdown in progress, new work refused
    #[error("Shutdown in progress")]
    ShutdownInProgress,

    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl XferdError {
    /// Returns true if the operation may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            XferdError::TransientStore { .. } | XferdError::QueueFull { .. }
        )
    }

    /// Returns true if this error must end the current process instance
    pub fn is_fatal(&self) -> bool {
        matches!(self, XferdError::WatchdogTripped { .. })
    }

    pub(crate) fn store(err: impl std::fmt::Display) -> Self {
        XferdError::TransientStore {
            message: err.to_string(),
        }
    }
}

/// Result type alias for xferd operations
pub type Result<T> = std::result::Result<T, XferdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let full = XferdError::QueueFull {
            kind: MessageKind::Status,
            capacity: 2,
        };
        assert!(full.is_retryable());
        assert!(!full.is_fatal());
        assert_eq!(full.to_string(), "status channel full (2 slots)");

        let tripped = XferdError::WatchdogTripped {
            path: CriticalPath::Retrieve,
            age_secs: 301,
            threshold_secs: 300,
        };
        assert!(tripped.is_fatal());
        assert!(!tripped.is_retryable());
    }
}
