//! Worker to coordinator message records
//!
//! All records are plain data with inline, fixed-capacity text fields and
//! a shared [`ErrorInfo`] sub-record.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::bring_online::BringOnlineState;
use super::text::{FixedText, JobId};
use crate::concurrency::TransferParams;

/// Transfer status text
pub const TRANSFER_STATUS_LEN: usize = 50;
/// Free-text transfer message
pub const TRANSFER_MESSAGE_LEN: usize = 1024;
/// Storage endpoint name
pub const ENDPOINT_LEN: usize = 100;
/// Error description
pub const ERROR_REASON_LEN: usize = 128;
/// Log originating host
pub const LOG_HOST_LEN: usize = 255;
/// Log file path
pub const LOG_PATH_LEN: usize = 1024;
/// VO name
pub const VO_NAME_LEN: usize = 50;
/// Job or file state text
pub const STATE_LEN: usize = 50;
/// Job or file metadata blob
pub const METADATA_LEN: usize = 1024;
/// Monitoring payload
pub const MONITORING_LEN: usize = 3000;

/// Default stream count carried by a fresh status record
pub const DEFAULT_STATUS_STREAMS: u32 = 2;
/// Default timeout (seconds) carried by a fresh status record
pub const DEFAULT_STATUS_TIMEOUT: u32 = 3600;

/// Well-known transfer status strings
pub mod status {
    pub const SUBMITTED: &str = "SUBMITTED";
    pub const READY: &str = "READY";
    pub const STAGING: &str = "STAGING";
    pub const ACTIVE: &str = "ACTIVE";
    pub const FINISHED: &str = "FINISHED";
    pub const FAILED: &str = "FAILED";
    pub const CANCELED: &str = "CANCELED";

    /// Terminal statuses end a transfer's activity tracking
    pub fn is_terminal(status: &str) -> bool {
        matches!(status, FINISHED | FAILED | CANCELED)
    }
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Error sub-record shared by every message kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// OS error number, if the failure came from the OS
    pub errno: Option<i32>,
    /// Bounded human-readable description
    pub reason: FixedText<ERROR_REASON_LEN>,
}

impl ErrorInfo {
    /// Build from an OS error number
    pub fn from_errno(code: i32) -> Self {
        let mut info = Self::default();
        info.set_error(code);
        info
    }

    /// Record an OS error number and its description.
    ///
    /// The description is produced per call into an owned buffer, so
    /// concurrent workers never share formatting state.
    pub fn set_error(&mut self, code: i32) {
        let described = std::io::Error::from_raw_os_error(code).to_string();
        let suffix = format!(" (os error {code})");
        let text = described.strip_suffix(&suffix).unwrap_or(&described);
        self.reason = FixedText::new(text);
        self.errno = Some(code);
    }

    /// Record a failure that has no OS error number
    pub fn set_reason(&mut self, reason: &str) {
        self.reason = FixedText::new(reason);
    }

    pub fn is_error(&self) -> bool {
        self.errno.is_some() || !self.reason.is_empty()
    }
}

/// Where a transfer failure originated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    Transfer,
    Source,
    Destination,
    Agent,
}

impl ErrorScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorScope::Transfer => "TRANSFER",
            ErrorScope::Source => "SOURCE",
            ErrorScope::Destination => "DESTINATION",
            ErrorScope::Agent => "GENERAL_FAILURE",
        }
    }
}

/// Transfer phase in which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPhase {
    TransferPreparation,
    Transfer,
    TransferFinalization,
    Allocation,
    TransferService,
}

impl ErrorPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorPhase::TransferPreparation => "TRANSFER_PREPARATION",
            ErrorPhase::Transfer => "TRANSFER",
            ErrorPhase::TransferFinalization => "TRANSFER_FINALIZATION",
            ErrorPhase::Allocation => "ALLOCATION",
            ErrorPhase::TransferService => "TRANSFER_SERVICE",
        }
    }
}

/// Coarse failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonClass {
    UserError,
    InternalError,
    ConnectionError,
    RequestTimeout,
    Locality,
    Aborted,
    GridftpError,
    HttpTimeout,
    InvalidPath,
    StorageInternalError,
    GeneralFailure,
    SecurityError,
}

impl ReasonClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonClass::UserError => "USER_ERROR",
            ReasonClass::InternalError => "INTERNAL_ERROR",
            ReasonClass::ConnectionError => "CONNECTION_ERROR",
            ReasonClass::RequestTimeout => "REQUEST_TIMEOUT",
            ReasonClass::Locality => "LOCALITY",
            ReasonClass::Aborted => "ABORTED",
            ReasonClass::GridftpError => "GRIDFTP_ERROR",
            ReasonClass::HttpTimeout => "HTTP_TIMEOUT",
            ReasonClass::InvalidPath => "INVALID_PATH",
            ReasonClass::StorageInternalError => "",
            ReasonClass::GeneralFailure => "GENERAL_FAILURE",
            ReasonClass::SecurityError => "SECURITY_ERROR",
        }
    }
}

/// Routine transfer status report
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransferStatus {
    pub error: ErrorInfo,
    pub job_id: JobId,
    pub file_id: u64,
    pub process_id: u32,
    pub status: FixedText<TRANSFER_STATUS_LEN>,
    pub message: FixedText<TRANSFER_MESSAGE_LEN>,
    pub source_se: FixedText<ENDPOINT_LEN>,
    pub dest_se: FixedText<ENDPOINT_LEN>,
    pub nostreams: u32,
    /// Seconds
    pub timeout: u32,
    /// Bytes, 0 lets TCP autotune
    pub buffersize: u32,
    pub filesize: u64,
    /// Milliseconds since epoch
    pub timestamp: i64,
    pub retry: bool,
    /// Seconds spent transferring
    pub elapsed_secs: f64,
    /// KiB/s
    pub throughput: f64,
}

impl TransferStatus {
    pub fn new(job_id: JobId, file_id: u64, status: &str) -> Self {
        Self {
            error: ErrorInfo::default(),
            job_id,
            file_id,
            process_id: std::process::id(),
            status: FixedText::new(status),
            message: FixedText::empty(),
            source_se: FixedText::empty(),
            dest_se: FixedText::empty(),
            nostreams: DEFAULT_STATUS_STREAMS,
            timeout: DEFAULT_STATUS_TIMEOUT,
            buffersize: 0,
            filesize: 0,
            timestamp: now_millis(),
            retry: false,
            elapsed_secs: 0.0,
            throughput: 0.0,
        }
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = FixedText::new(message);
        self
    }

    pub fn with_endpoints(mut self, source_se: &str, dest_se: &str) -> Self {
        self.source_se = FixedText::new(source_se);
        self.dest_se = FixedText::new(dest_se);
        self
    }

    /// Stamp the transfer parameters this transfer ran with
    pub fn with_params(mut self, params: TransferParams) -> Self {
        self.nostreams = params.nostreams;
        self.timeout = params.timeout;
        self.buffersize = params.buffersize;
        self
    }

    /// Fill the message with a classified failure description.
    ///
    /// Format: `<SCOPE> [<errno>] <PHASE> <CLASS> <detail>`
    pub fn with_failure(
        mut self,
        scope: ErrorScope,
        phase: ErrorPhase,
        class: ReasonClass,
        detail: &str,
    ) -> Self {
        let text = format!(
            "{} [{}] {} {} {}",
            scope.as_str(),
            self.error.errno.unwrap_or(0),
            phase.as_str(),
            class.as_str(),
            detail
        );
        self.message = FixedText::new(&text);
        self
    }
}

/// High-frequency throughput sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThroughputUpdate {
    pub error: ErrorInfo,
    pub job_id: JobId,
    pub file_id: u64,
    pub process_id: u32,
    pub timestamp: i64,
    pub throughput: f64,
    /// Bytes transferred so far
    pub transferred: u64,
}

impl ThroughputUpdate {
    pub fn new(job_id: JobId, file_id: u64, throughput: f64, transferred: u64) -> Self {
        Self {
            error: ErrorInfo::default(),
            job_id,
            file_id,
            process_id: std::process::id(),
            timestamp: now_millis(),
            throughput,
            transferred,
        }
    }
}

/// Location of a transfer's log file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub error: ErrorInfo,
    pub job_id: JobId,
    pub file_id: u64,
    pub host: FixedText<LOG_HOST_LEN>,
    pub file_path: FixedText<LOG_PATH_LEN>,
    pub debug: bool,
    pub timestamp: i64,
}

impl LogLine {
    pub fn new(job_id: JobId, file_id: u64, host: &str, file_path: &str, debug: bool) -> Self {
        Self {
            error: ErrorInfo::default(),
            job_id,
            file_id,
            host: FixedText::new(host),
            file_path: FixedText::new(file_path),
            debug,
            timestamp: now_millis(),
        }
    }
}

/// Out-of-band job/file state notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub error: ErrorInfo,
    pub vo_name: FixedText<VO_NAME_LEN>,
    pub source_se: FixedText<ENDPOINT_LEN>,
    pub dest_se: FixedText<ENDPOINT_LEN>,
    pub job_id: JobId,
    pub file_id: u64,
    pub job_state: FixedText<STATE_LEN>,
    pub file_state: FixedText<STATE_LEN>,
    pub retry_counter: u32,
    pub retry_max: u32,
    pub job_metadata: FixedText<METADATA_LEN>,
    pub file_metadata: FixedText<METADATA_LEN>,
    pub timestamp: i64,
}

impl StateChange {
    pub fn new(job_id: JobId, file_id: u64, job_state: &str, file_state: &str) -> Self {
        Self {
            error: ErrorInfo::default(),
            vo_name: FixedText::empty(),
            source_se: FixedText::empty(),
            dest_se: FixedText::empty(),
            job_id,
            file_id,
            job_state: FixedText::new(job_state),
            file_state: FixedText::new(file_state),
            retry_counter: 0,
            retry_max: 0,
            job_metadata: FixedText::empty(),
            file_metadata: FixedText::empty(),
            timestamp: now_millis(),
        }
    }

    pub fn with_link(mut self, vo_name: &str, source_se: &str, dest_se: &str) -> Self {
        self.vo_name = FixedText::new(vo_name);
        self.source_se = FixedText::new(source_se);
        self.dest_se = FixedText::new(dest_se);
        self
    }

    pub fn with_retries(mut self, counter: u32, max: u32) -> Self {
        self.retry_counter = counter;
        self.retry_max = max;
        self
    }

    pub fn with_metadata(mut self, job_metadata: &str, file_metadata: &str) -> Self {
        self.job_metadata = FixedText::new(job_metadata);
        self.file_metadata = FixedText::new(file_metadata);
        self
    }
}

/// Unstructured telemetry payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringEvent {
    pub error: ErrorInfo,
    pub payload: FixedText<MONITORING_LEN>,
    pub timestamp: i64,
}

impl MonitoringEvent {
    pub fn new(payload: &str) -> Self {
        Self {
            error: ErrorInfo::default(),
            payload: FixedText::new(payload),
            timestamp: now_millis(),
        }
    }
}

/// Message kind, one bounded channel per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Status,
    Throughput,
    Log,
    BringOnline,
    State,
    Monitoring,
}

impl MessageKind {
    pub const ALL: [MessageKind; 6] = [
        MessageKind::Status,
        MessageKind::Throughput,
        MessageKind::Log,
        MessageKind::BringOnline,
        MessageKind::State,
        MessageKind::Monitoring,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Status => "status",
            MessageKind::Throughput => "throughput",
            MessageKind::Log => "log",
            MessageKind::BringOnline => "bring_online",
            MessageKind::State => "state",
            MessageKind::Monitoring => "monitoring",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any worker message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Status(TransferStatus),
    Throughput(ThroughputUpdate),
    Log(LogLine),
    BringOnline(BringOnlineState),
    State(StateChange),
    Monitoring(MonitoringEvent),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Status(_) => MessageKind::Status,
            Message::Throughput(_) => MessageKind::Throughput,
            Message::Log(_) => MessageKind::Log,
            Message::BringOnline(_) => MessageKind::BringOnline,
            Message::State(_) => MessageKind::State,
            Message::Monitoring(_) => MessageKind::Monitoring,
        }
    }

    pub fn error(&self) -> &ErrorInfo {
        match self {
            Message::Status(m) => &m.error,
            Message::Throughput(m) => &m.error,
            Message::Log(m) => &m.error,
            Message::BringOnline(m) => &m.error,
            Message::State(m) => &m.error,
            Message::Monitoring(m) => &m.error,
        }
    }

    pub fn error_mut(&mut self) -> &mut ErrorInfo {
        match self {
            Message::Status(m) => &mut m.error,
            Message::Throughput(m) => &mut m.error,
            Message::Log(m) => &mut m.error,
            Message::BringOnline(m) => &mut m.error,
            Message::State(m) => &mut m.error,
            Message::Monitoring(m) => &mut m.error,
        }
    }
}

macro_rules! impl_from_record {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Message {
                fn from(record: $ty) -> Self {
                    Message::$variant(record)
                }
            }
        )*
    };
}

impl_from_record! {
    Status => TransferStatus,
    Throughput => ThroughputUpdate,
    Log => LogLine,
    BringOnline => BringOnlineState,
    State => StateChange,
    Monitoring => MonitoringEvent,
}
