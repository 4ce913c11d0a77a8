use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    feed::FeedCounters,
    portfolio::account::AccountStatus,
};

pub mod kernel;
pub mod monitor;
pub mod strategy;

pub use kernel::{Session, SessionBuilder};
pub use monitor::SessionMonitor;
pub use strategy::{Strategy, TickCtx};

/// Session lifecycle.
///
/// The state machine has exactly these transitions; anything else is an
/// error:
///
/// ```md
/// Current State | Trigger                        | Next State
/// --------------|--------------------------------|-----------
/// `Idle`        | start()                        | Running
/// `Idle`        | reset()                        | Idle
/// `Running`     | stop() observed at a boundary  | Stopped
/// `Running`     | end of stream                  | Stopped
/// `Running`     | account blown                  | Stopped
/// `Stopped`     | reset()                        | Idle
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    Display,
    IntoStaticStr,
    Default,
)]
#[strum(serialize_all = "lowercase")]
pub enum SessionState {
    /// Created but not started. Waiting for `start()`.
    #[default]
    Idle,
    /// Actively processing ticks.
    Running,
    /// Terminal for this run; `reset()` returns to `Idle`.
    Stopped,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// Why a run ended.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    Display,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum EndReason {
    EndOfStream,
    StopRequested,
    AccountBlown,
}

/// Raw counters and balances at a point in time. No derived statistics:
/// downstream reporters aggregate Sharpe and friends from the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub state: SessionState,
    pub tick_count: u64,
    pub feed: FeedCounters,
    pub executions: u64,
    pub rejections: u64,
    pub pending_orders: u64,
    pub balance: f64,
    pub equity: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub commission_paid: f64,
    pub drawdown_percent: f64,
    pub max_drawdown_experienced: f64,
    pub trades: u64,
    pub winning: u64,
    pub losing: u64,
    pub breakeven: u64,
    pub consecutive_wins: u64,
    pub consecutive_losses: u64,
    pub account_status: AccountStatus,
    pub execution_history_len: usize,
    pub error_log_len: usize,
}

/// Everything a reporter needs about a finished run, assembled once when the
/// session stops and handed to `on_session_end` exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub reason: EndReason,
    pub ticks_processed: u64,
    pub executions: u64,
    pub rejections: u64,
    pub pending_orders: u64,
    pub feed: FeedCounters,
    pub final_balance: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub commission_paid: f64,
    pub max_drawdown_experienced: f64,
    pub trades: u64,
    pub winning: u64,
    pub losing: u64,
    pub breakeven: u64,
    pub account_status: AccountStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
    /// Wall-clock processing time in milliseconds.
    pub wall_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(SessionState::Idle.is_idle());
        assert!(SessionState::Running.is_running());
        assert!(SessionState::Stopped.is_stopped());
        assert!(!SessionState::Idle.is_running());
    }

    #[test]
    fn test_end_reason_strings() {
        assert_eq!(EndReason::AccountBlown.to_string(), "account_blown");
        assert_eq!(EndReason::EndOfStream.to_string(), "end_of_stream");
    }
}
