// === Public Modules (The Canonical Paths) ===
pub mod config;
pub mod domain;
pub mod error;
pub mod exec;
pub mod feed;
pub mod instrument;
pub mod portfolio;
pub mod session;

// === Private Implementation Details ===
mod macros;

// === Small Containers ===
pub mod bounded_log;

// === Facades (Re-exporting the types users touch constantly) ===
pub use crate::config::SimConfig;
pub use crate::domain::{Direction, Price, Qty, Tick};
pub use crate::error::{ErrorCode, ErrorRecord, SimError, SimResult};
pub use crate::exec::{
    ExecutionReport, ExecutionStatus, FrictionModel, Order, OrderAction, OrderId, OrderType,
};
pub use crate::feed::{BatchFeed, CsvFeed, FeedEvent, StreamingFeed, TickFeed, VecFeed};
pub use crate::instrument::{Instrument, InstrumentKind};
pub use crate::portfolio::{AccountSnapshot, AccountStatus, PositionSnapshot, StatusTransition};
pub use crate::session::{
    EndReason, MetricsSnapshot, Session, SessionMonitor, SessionState, SessionSummary, Strategy,
    TickCtx,
};
