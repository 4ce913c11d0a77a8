use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    domain::Tick,
    error::ErrorRecord,
    exec::order::ExecutionReport,
    portfolio::{account::AccountSnapshot, position::PositionSnapshot},
    session::{kernel::SharedState, MetricsSnapshot, SessionState, SessionSummary},
};

/// Cloneable read-only view of a running session, safe to hand to other
/// threads.
///
/// Every accessor takes a shared guard and returns a copy; the session loop
/// holds the exclusive guard only around each tick's mutation block, so
/// readers never observe a half-applied tick and never block the loop for
/// long.
#[derive(Clone)]
pub struct SessionMonitor {
    shared: Arc<RwLock<SharedState>>,
}

impl SessionMonitor {
    pub(crate) fn new(shared: Arc<RwLock<SharedState>>) -> Self {
        Self { shared }
    }

    pub fn state(&self) -> SessionState {
        self.shared.read().state
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn is_account_blown(&self) -> bool {
        self.shared.read().account.status().is_blown()
    }

    pub fn tick_count(&self) -> u64 {
        self.shared.read().tick_count
    }

    pub fn current_tick(&self) -> Option<Tick> {
        self.shared.read().current_tick
    }

    pub fn account(&self) -> AccountSnapshot {
        self.shared.read().account.snapshot()
    }

    pub fn position(&self) -> PositionSnapshot {
        self.shared.read().position.snapshot()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.read().metrics()
    }

    pub fn execution_history(&self) -> Vec<ExecutionReport> {
        self.shared.read().execution_history.to_vec()
    }

    pub fn error_log(&self) -> Vec<ErrorRecord> {
        self.shared.read().error_log.to_vec()
    }

    pub fn summary(&self) -> Option<SessionSummary> {
        self.shared.read().summary.clone()
    }
}
