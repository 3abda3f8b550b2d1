//! Node runtime
//!
//! The tokio runtime, the periodic background services it hosts and the
//! ordered shutdown that stops them.

pub mod container;
pub mod dispatch;
pub mod executor;
pub mod ingest;
pub mod shutdown;
pub mod stall;

pub use container::{BackgroundService, NodeHandles, ServiceContainer};
pub use dispatch::{DispatchContext, DispatchService, Dispatcher, IdleDispatcher};
pub use executor::ServiceRuntime;
pub use ingest::{IngestionService, MessageSink, TracingSink};
pub use shutdown::{InFlightGuard, OrderedShutdown, ShutdownOutcome};
pub use stall::{StallCheckService, StalledTransfer, TransferActivity};
