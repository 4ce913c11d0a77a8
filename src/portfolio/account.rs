use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{exec::order::ExecutionReport, portfolio::position::PositionSnapshot};

/// Fraction of the drawdown limit at which the account is flagged as
/// approaching it.
const AT_LIMIT_FRACTION: f64 = 0.95;

// ================================================================================================
// Status
// ================================================================================================

/// Account lifecycle. `Blown` is terminal: once the drawdown limit is
/// breached, trading is disabled for the rest of the session.
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
#[strum(serialize_all = "snake_case")]
pub enum AccountStatus {
    #[default]
    Active,
    /// Drawdown within 5% of the configured limit.
    AtLimit,
    /// Drawdown breached the configured limit.
    Blown,
}

impl AccountStatus {
    pub fn is_blown(&self) -> bool {
        matches!(self, Self::Blown)
    }
}

/// Old and new status around one applied report, so the session can dispatch
/// a status-change callback when it actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: AccountStatus,
    pub to: AccountStatus,
}

impl StatusTransition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    pub fn blew_up(&self) -> bool {
        !self.from.is_blown() && self.to.is_blown()
    }
}

// ================================================================================================
// Account
// ================================================================================================

/// Mutable financial state of the simulated account.
///
/// Invariants:
/// - `current_balance == initial_balance + total_realized_pnl - commission_paid`
/// - `high_water_mark >= current_balance >= low_water_mark`
/// - `status == Blown ⇔ drawdown breached max_drawdown_percent` (sticky)
#[derive(Debug, Clone)]
pub struct Account {
    initial_balance: f64,
    current_balance: f64,
    currency: String,
    leverage: f64,
    used_margin: f64,
    available_margin: f64,
    buying_power: f64,
    total_realized_pnl: f64,
    total_unrealized_pnl: f64,
    commission_paid: f64,
    trades: u64,
    winning: u64,
    losing: u64,
    breakeven: u64,
    consecutive_wins: u64,
    consecutive_losses: u64,
    high_water_mark: f64,
    low_water_mark: f64,
    max_drawdown_experienced: f64,
    status: AccountStatus,
    /// Policy limit in percent of peak equity.
    max_drawdown_percent: f64,
    /// Absolute exposure after the previous applied report; a shrink means a
    /// trade outcome was realized.
    prev_abs_exposure: f64,
}

impl Account {
    pub fn new(
        initial_balance: f64,
        currency: impl Into<String>,
        leverage: f64,
        max_drawdown_percent: f64,
    ) -> Self {
        Self {
            initial_balance,
            current_balance: initial_balance,
            currency: currency.into(),
            leverage,
            used_margin: 0.0,
            available_margin: initial_balance * leverage,
            buying_power: initial_balance * leverage,
            total_realized_pnl: 0.0,
            total_unrealized_pnl: 0.0,
            commission_paid: 0.0,
            trades: 0,
            winning: 0,
            losing: 0,
            breakeven: 0,
            consecutive_wins: 0,
            consecutive_losses: 0,
            high_water_mark: initial_balance,
            low_water_mark: initial_balance,
            max_drawdown_experienced: 0.0,
            status: AccountStatus::Active,
            max_drawdown_percent,
            prev_abs_exposure: 0.0,
        }
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    pub fn current_balance(&self) -> f64 {
        self.current_balance
    }

    pub fn buying_power(&self) -> f64 {
        self.buying_power
    }

    /// Percentage decline from peak equity, never negative.
    pub fn drawdown_percent(&self) -> f64 {
        if self.high_water_mark <= 0.0 {
            return 0.0;
        }
        ((self.high_water_mark - self.current_balance) / self.high_water_mark * 100.0).max(0.0)
    }

    /// Applies an execution report the position just absorbed.
    ///
    /// Returns the status transition so the caller can dispatch callbacks
    /// and stop the session when the account blows.
    pub fn apply(
        &mut self,
        report: &ExecutionReport,
        position: &PositionSnapshot,
    ) -> StatusTransition {
        let from = self.status;

        self.commission_paid += report.commission;
        self.total_realized_pnl += report.realized_pnl_delta;
        self.current_balance =
            self.initial_balance + self.total_realized_pnl - self.commission_paid;

        // Win/loss bookkeeping happens when exposure shrinks: that is the
        // moment a trade outcome becomes real.
        let abs_exposure = position.signed_size.abs();
        if abs_exposure < self.prev_abs_exposure {
            self.trades += 1;
            if report.realized_pnl_delta > 0.0 {
                self.winning += 1;
                self.consecutive_wins += 1;
                self.consecutive_losses = 0;
            } else if report.realized_pnl_delta < 0.0 {
                self.losing += 1;
                self.consecutive_losses += 1;
                self.consecutive_wins = 0;
            } else {
                self.breakeven += 1;
            }
        }
        self.prev_abs_exposure = abs_exposure;

        self.high_water_mark = self.high_water_mark.max(self.current_balance);
        self.low_water_mark = self.low_water_mark.min(self.current_balance);
        let drawdown = self.drawdown_percent();
        self.max_drawdown_experienced = self.max_drawdown_experienced.max(drawdown);

        self.buying_power = self.current_balance * self.leverage;
        self.used_margin = abs_exposure * report.fill_price.0 / self.leverage;
        self.available_margin = self.buying_power - self.used_margin;

        let to = self.next_status(drawdown);
        self.status = to;

        let transition = StatusTransition { from, to };
        if transition.changed() {
            tracing::info!(
                from = %from,
                to = %to,
                drawdown_percent = drawdown,
                balance = self.current_balance,
                "account status changed"
            );
        }
        transition
    }

    /// Mark update: refreshes the unrealized aggregate only.
    pub fn mark(&mut self, position: &PositionSnapshot) {
        self.total_unrealized_pnl = position.unrealized_pnl;
    }

    fn next_status(&self, drawdown: f64) -> AccountStatus {
        if self.status.is_blown() {
            return AccountStatus::Blown;
        }
        if drawdown > self.max_drawdown_percent {
            AccountStatus::Blown
        } else if drawdown >= AT_LIMIT_FRACTION * self.max_drawdown_percent {
            AccountStatus::AtLimit
        } else {
            AccountStatus::Active
        }
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            initial_balance: self.initial_balance,
            current_balance: self.current_balance,
            currency: self.currency.clone(),
            leverage: self.leverage,
            used_margin: self.used_margin,
            available_margin: self.available_margin,
            buying_power: self.buying_power,
            total_realized_pnl: self.total_realized_pnl,
            total_unrealized_pnl: self.total_unrealized_pnl,
            commission_paid: self.commission_paid,
            trades: self.trades,
            winning: self.winning,
            losing: self.losing,
            breakeven: self.breakeven,
            consecutive_wins: self.consecutive_wins,
            consecutive_losses: self.consecutive_losses,
            high_water_mark: self.high_water_mark,
            low_water_mark: self.low_water_mark,
            max_drawdown_experienced: self.max_drawdown_experienced,
            drawdown_percent: self.drawdown_percent(),
            max_drawdown_percent: self.max_drawdown_percent,
            status: self.status,
        }
    }
}

/// Read-only copy of account state handed to strategies and the resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub initial_balance: f64,
    pub current_balance: f64,
    pub currency: String,
    pub leverage: f64,
    pub used_margin: f64,
    pub available_margin: f64,
    pub buying_power: f64,
    pub total_realized_pnl: f64,
    pub total_unrealized_pnl: f64,
    pub commission_paid: f64,
    pub trades: u64,
    pub winning: u64,
    pub losing: u64,
    pub breakeven: u64,
    pub consecutive_wins: u64,
    pub consecutive_losses: u64,
    pub high_water_mark: f64,
    pub low_water_mark: f64,
    pub max_drawdown_experienced: f64,
    pub drawdown_percent: f64,
    pub max_drawdown_percent: f64,
    pub status: AccountStatus,
}
