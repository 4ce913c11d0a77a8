use chrono::{DateTime, Utc};
use smallvec::SmallVec;

use crate::{
    domain::{Price, Qty, Tick},
    error::ErrorRecord,
    exec::order::{ExecutionReport, Order, OrderAction, OrderId},
    portfolio::{account::AccountSnapshot, account::StatusTransition, position::PositionSnapshot},
    session::{MetricsSnapshot, SessionSummary},
};

/// The decision-making side of a backtest, driven by the session loop.
///
/// `on_tick` is the only required method: it sees each tick exactly once,
/// in order, and submits orders through the [`TickCtx`]. Every order
/// submitted there resolves against that same tick, in submission order,
/// before the next tick is fetched. The remaining callbacks default to
/// no-ops.
///
/// Callbacks run on the session thread; they must not hand session state to
/// concurrent workers.
pub trait Strategy {
    fn on_tick(&mut self, tick: &Tick, ctx: &mut TickCtx);

    fn on_execution(&mut self, _report: &ExecutionReport) {}

    fn on_error(&mut self, _record: &ErrorRecord) {}

    fn on_status_change(&mut self, _transition: StatusTransition) {}

    fn on_session_end(&mut self, _summary: &SessionSummary) {}
}

/// Per-tick window handed to [`Strategy::on_tick`]: read-only snapshots of
/// the books plus the order queue for this tick.
pub struct TickCtx {
    tick_time: DateTime<Utc>,
    position: PositionSnapshot,
    account: AccountSnapshot,
    metrics: MetricsSnapshot,
    orders: SmallVec<[Order; 4]>,
    next_auto_id: u64,
}

impl TickCtx {
    pub(crate) fn new(
        tick_time: DateTime<Utc>,
        position: PositionSnapshot,
        account: AccountSnapshot,
        metrics: MetricsSnapshot,
        next_auto_id: u64,
    ) -> Self {
        Self {
            tick_time,
            position,
            account,
            metrics,
            orders: SmallVec::new(),
            next_auto_id,
        }
    }

    /// Queues an order for resolution against the current tick.
    pub fn submit(&mut self, order: Order) {
        self.orders.push(order);
    }

    /// Queues a market buy with a session-assigned id.
    pub fn buy(&mut self, size: Qty) -> OrderId {
        let id = self.auto_id();
        self.submit(Order::market(id, OrderAction::Buy, size, self.tick_time));
        id
    }

    /// Queues a market sell with a session-assigned id.
    pub fn sell(&mut self, size: Qty) -> OrderId {
        let id = self.auto_id();
        self.submit(Order::market(id, OrderAction::Sell, size, self.tick_time));
        id
    }

    /// Queues a limit buy with a session-assigned id.
    pub fn buy_limit(&mut self, size: Qty, limit: Price) -> OrderId {
        let id = self.auto_id();
        self.submit(Order::limit(id, OrderAction::Buy, size, limit, self.tick_time));
        id
    }

    /// Queues a limit sell with a session-assigned id.
    pub fn sell_limit(&mut self, size: Qty, limit: Price) -> OrderId {
        let id = self.auto_id();
        self.submit(Order::limit(id, OrderAction::Sell, size, limit, self.tick_time));
        id
    }

    pub fn position(&self) -> &PositionSnapshot {
        &self.position
    }

    pub fn account(&self) -> &AccountSnapshot {
        &self.account
    }

    pub fn metrics(&self) -> &MetricsSnapshot {
        &self.metrics
    }

    fn auto_id(&mut self) -> OrderId {
        let id = OrderId(self.next_auto_id);
        self.next_auto_id += 1;
        id
    }

    pub(crate) fn into_orders(self) -> (SmallVec<[Order; 4]>, u64) {
        (self.orders, self.next_auto_id)
    }
}

/// A strategy that never trades. Useful for replaying data to observe marks
/// and metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassiveStrategy;

impl Strategy for PassiveStrategy {
    fn on_tick(&mut self, _tick: &Tick, _ctx: &mut TickCtx) {}
}
