use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    bounded_log::BoundedLog,
    domain::{Direction, Price, Qty, Tick},
    error::{SessionError, SimResult},
    exec::order::{ExecutionReport, OrderAction},
    instrument::Instrument,
};

/// Retained fills per position.
pub const FILL_HISTORY_CAPACITY: usize = 10_000;

/// Signed sizes inside this band collapse to flat, so a full round trip
/// cannot leave residual dust from float arithmetic.
const FLAT_EPSILON: f64 = 1e-12;

// ================================================================================================
// Fills
// ================================================================================================

/// One executed fill as recorded in the position's history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub timestamp: DateTime<Utc>,
    pub action: OrderAction,
    pub size: Qty,
    pub price: Price,
    pub commission: f64,
}

/// What a fill would do to a position, computed without mutating anything.
///
/// This is the single source of the netting arithmetic: the resolver uses it
/// to fill in report fields, and [`Position::apply`] uses it to commit, so
/// report and state cannot drift apart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillPreview {
    pub signed_size_after: f64,
    pub entry_price_after: Price,
    pub realized_pnl_delta: f64,
    pub unrealized_pnl_after: f64,
    /// Whether the fill reduced or closed existing exposure.
    pub reduced_exposure: bool,
}

/// Computes the position mutation a fill implies.
///
/// Same-side fills extend the position and re-weight the average entry.
/// Opposing fills first close against the existing exposure (realizing P&L
/// on the closed portion at the held average entry), and any excess flips
/// the position with the fill price as its new entry.
///
/// `mark_price` is the price used for the post-fill unrealized P&L
/// (typically the resolving tick's mid).
pub fn preview_fill(
    signed_size: f64,
    average_entry: Price,
    action: OrderAction,
    qty: Qty,
    fill_price: Price,
    mark_price: Price,
    instrument: &Instrument,
) -> FillPreview {
    let Some(direction) = action.direction() else {
        // Hold: nothing moves.
        return FillPreview {
            signed_size_after: signed_size,
            entry_price_after: average_entry,
            realized_pnl_delta: 0.0,
            unrealized_pnl_after: unrealized(signed_size, average_entry, mark_price, instrument),
            reduced_exposure: false,
        };
    };

    let d = direction.sign();
    let before = signed_size;
    let mut after = before + d * qty.0;
    if after.abs() < FLAT_EPSILON {
        after = 0.0;
    }

    let mut realized_delta = 0.0;
    let mut entry_after = average_entry;
    let mut reduced = false;

    let same_side = before == 0.0 || (before > 0.0) == (d > 0.0);
    if same_side {
        let total = before.abs() + qty.0;
        if total > 0.0 {
            entry_after =
                Price((average_entry.0 * before.abs() + fill_price.0 * qty.0) / total);
        }
    } else {
        reduced = true;
        let closed = qty.0.min(before.abs());
        realized_delta = instrument.pnl(
            average_entry,
            fill_price,
            Qty(closed),
            Direction::of(before),
        );

        if qty.0 > before.abs() {
            // Flipped through flat: the excess opens fresh at the fill price.
            entry_after = fill_price;
        } else if after == 0.0 {
            entry_after = Price(0.0);
        }
    }

    FillPreview {
        signed_size_after: after,
        entry_price_after: entry_after,
        realized_pnl_delta: realized_delta,
        unrealized_pnl_after: unrealized(after, entry_after, mark_price, instrument),
        reduced_exposure: reduced,
    }
}

fn unrealized(signed_size: f64, entry: Price, mark: Price, instrument: &Instrument) -> f64 {
    if signed_size == 0.0 {
        return 0.0;
    }
    instrument.pnl(
        entry,
        mark,
        Qty(signed_size.abs()),
        Direction::of(signed_size),
    )
}

// ================================================================================================
// Position
// ================================================================================================

/// Per-symbol mutable position state. Created with the session, mutated only
/// by applying execution reports and mark-to-market ticks, destroyed with
/// the session.
///
/// Invariant: `signed_size == 0 ⇒ unrealized_pnl == 0`.
#[derive(Debug, Clone)]
pub struct Position {
    symbol: String,
    signed_size: f64,
    average_entry_price: Price,
    realized_pnl: f64,
    unrealized_pnl: f64,
    commission_paid: f64,
    /// Best unrealized P&L of the currently open position.
    peak_profit: f64,
    /// Worst unrealized P&L of the currently open position.
    peak_loss: f64,
    /// Best unrealized P&L reached by any position this session.
    max_favorable_excursion: f64,
    /// Worst unrealized P&L reached by any position this session.
    max_adverse_excursion: f64,
    opened_at: Option<DateTime<Utc>>,
    last_update_at: Option<DateTime<Utc>>,
    fill_history: BoundedLog<Fill>,
}

impl Position {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            signed_size: 0.0,
            average_entry_price: Price(0.0),
            realized_pnl: 0.0,
            unrealized_pnl: 0.0,
            commission_paid: 0.0,
            peak_profit: 0.0,
            peak_loss: 0.0,
            max_favorable_excursion: 0.0,
            max_adverse_excursion: 0.0,
            opened_at: None,
            last_update_at: None,
            fill_history: BoundedLog::new(FILL_HISTORY_CAPACITY),
        }
    }

    pub fn signed_size(&self) -> f64 {
        self.signed_size
    }

    pub fn is_flat(&self) -> bool {
        self.signed_size == 0.0
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.unrealized_pnl
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn fill_history(&self) -> &BoundedLog<Fill> {
        &self.fill_history
    }

    /// Applies a fill-bearing execution report.
    ///
    /// Precondition: `report.status ∈ {Filled, Partial}` with a non-zero
    /// filled size; anything else is a caller bug.
    pub fn apply(&mut self, report: &ExecutionReport, instrument: &Instrument) -> SimResult<()> {
        if !report.is_applicable() {
            return Err(SessionError::NotApplicable(report.status.to_string()).into());
        }

        let was_flat = self.is_flat();
        let preview = preview_fill(
            self.signed_size,
            self.average_entry_price,
            report.action,
            report.filled_size,
            report.fill_price,
            report.fill_price,
            instrument,
        );

        let flipped = !was_flat
            && preview.signed_size_after != 0.0
            && (preview.signed_size_after > 0.0) != (self.signed_size > 0.0);

        self.signed_size = preview.signed_size_after;
        self.average_entry_price = preview.entry_price_after;
        self.realized_pnl += preview.realized_pnl_delta;
        self.commission_paid += report.commission;
        // The report's unrealized figure was computed against the resolving
        // tick's mid; adopt it rather than re-marking at the fill price.
        self.unrealized_pnl = if self.is_flat() {
            0.0
        } else {
            report.unrealized_pnl_after
        };

        if self.is_flat() {
            self.average_entry_price = Price(0.0);
            self.opened_at = None;
        } else if was_flat || flipped {
            self.opened_at = Some(report.timestamp);
            self.peak_profit = 0.0;
            self.peak_loss = 0.0;
        }
        self.last_update_at = Some(report.timestamp);

        self.fill_history.push(Fill {
            timestamp: report.timestamp,
            action: report.action,
            size: report.filled_size,
            price: report.fill_price,
            commission: report.commission,
        });

        tracing::debug!(
            symbol = %self.symbol,
            signed_size = self.signed_size,
            realized_delta = preview.realized_pnl_delta,
            "position updated"
        );

        Ok(())
    }

    /// Mark-to-market against a tick: recomputes unrealized P&L and the
    /// excursion extremes. Never touches realized P&L or size.
    pub fn mark(&mut self, tick: &Tick, instrument: &Instrument) {
        self.last_update_at = Some(tick.timestamp);
        if self.is_flat() {
            self.unrealized_pnl = 0.0;
            return;
        }

        self.unrealized_pnl = unrealized(
            self.signed_size,
            self.average_entry_price,
            tick.mid(),
            instrument,
        );

        self.peak_profit = self.peak_profit.max(self.unrealized_pnl);
        self.peak_loss = self.peak_loss.min(self.unrealized_pnl);
        self.max_favorable_excursion = self.max_favorable_excursion.max(self.unrealized_pnl);
        self.max_adverse_excursion = self.max_adverse_excursion.min(self.unrealized_pnl);
    }

    pub fn snapshot(&self) -> PositionSnapshot {
        PositionSnapshot {
            symbol: self.symbol.clone(),
            signed_size: self.signed_size,
            average_entry_price: self.average_entry_price,
            realized_pnl: self.realized_pnl,
            unrealized_pnl: self.unrealized_pnl,
            commission_paid: self.commission_paid,
            peak_profit: self.peak_profit,
            peak_loss: self.peak_loss,
            max_favorable_excursion: self.max_favorable_excursion,
            max_adverse_excursion: self.max_adverse_excursion,
            opened_at: self.opened_at,
            last_update_at: self.last_update_at,
            fills_recorded: self.fill_history.len(),
        }
    }
}

/// Read-only copy of position state handed to strategies and the resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub signed_size: f64,
    pub average_entry_price: Price,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub commission_paid: f64,
    pub peak_profit: f64,
    pub peak_loss: f64,
    pub max_favorable_excursion: f64,
    pub max_adverse_excursion: f64,
    pub opened_at: Option<DateTime<Utc>>,
    pub last_update_at: Option<DateTime<Utc>>,
    pub fills_recorded: usize,
}

impl PositionSnapshot {
    pub fn is_flat(&self) -> bool {
        self.signed_size == 0.0
    }
}
