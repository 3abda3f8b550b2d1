//! Worker to coordinator message protocol
//!
//! Fixed-shape records, one bounded FIFO channel per record kind.

pub mod bring_online;
pub mod channel;
pub mod legacy;
pub mod messages;
pub mod text;

pub use bring_online::{BringOnlineState, PinStatus, StagingPhase};
pub use channel::{message_bus, DrainedBatch, MessageConsumer, MessageProducer, RateLimitedWarn};
pub use legacy::LegacyStatus;
pub use messages::{
    status, ErrorInfo, ErrorPhase, ErrorScope, LogLine, Message, MessageKind, MonitoringEvent,
    ReasonClass, StateChange, ThroughputUpdate, TransferStatus,
};
pub use text::{FixedText, JobId, JOB_ID_LEN};
