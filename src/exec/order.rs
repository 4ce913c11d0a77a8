use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    domain::{Direction, Price, Qty},
    error::ErrorCode,
    impl_from_primitive,
};

/// Strategy-assigned order identifier, echoed back on the execution report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct OrderId(pub u64);
impl_from_primitive!(OrderId, u64);

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
#[strum(serialize_all = "lowercase")]
pub enum OrderAction {
    Buy,
    Sell,
    /// Explicit no-op: resolves to a `Filled` report with zero quantity.
    Hold,
}

impl OrderAction {
    /// The exposure direction this action creates. `Hold` has none.
    pub fn direction(&self) -> Option<Direction> {
        match self {
            OrderAction::Buy => Some(Direction::Long),
            OrderAction::Sell => Some(Direction::Short),
            OrderAction::Hold => None,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    Display,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

// ================================================================================================
// Order
// ================================================================================================

/// A strategy-issued intent, resolved against the tick it was submitted on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub action: OrderAction,
    pub order_type: OrderType,
    /// Lots, shares, or units depending on the instrument.
    pub size: Qty,
    /// Required iff `order_type == Limit`.
    pub limit_price: Option<Price>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn market(
        id: OrderId,
        action: OrderAction,
        size: Qty,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            action,
            order_type: OrderType::Market,
            size,
            limit_price: None,
            created_at,
        }
    }

    pub fn limit(
        id: OrderId,
        action: OrderAction,
        size: Qty,
        limit_price: Price,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            action,
            order_type: OrderType::Limit,
            size,
            limit_price: Some(limit_price),
            created_at,
        }
    }

    pub fn hold(id: OrderId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            action: OrderAction::Hold,
            order_type: OrderType::Market,
            size: Qty(0.0),
            limit_price: None,
            created_at,
        }
    }
}

// ================================================================================================
// Execution Reports
// ================================================================================================

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
#[strum(serialize_all = "lowercase")]
pub enum ExecutionStatus {
    /// The full requested quantity filled (or a no-op `Hold`).
    Filled,
    /// Liquidity allowed only part of the requested quantity.
    Partial,
    /// Limit condition not met on this tick; nothing filled, nothing logged.
    Pending,
    /// Order failed validation or execution; nothing filled.
    Rejected,
}

/// The immutable outcome of resolving one order against one tick.
///
/// Status invariants, enforced by the constructors:
/// - `Rejected` ⇒ `filled_size == 0`
/// - `Filled`   ⇒ `filled_size == requested_size` (zero for `Hold`)
/// - `Partial`  ⇒ `0 < filled_size < requested_size`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub order_id: OrderId,
    /// Timestamp of the resolving tick.
    pub timestamp: DateTime<Utc>,
    pub action: OrderAction,
    pub requested_size: Qty,
    pub filled_size: Qty,
    pub fill_price: Price,
    /// Price units of adverse adjustment applied to the fill.
    pub slippage_units: f64,
    pub commission: f64,
    /// Signed position size once this report is applied.
    pub position_after: f64,
    pub entry_price_after: Price,
    pub realized_pnl_delta: f64,
    pub unrealized_pnl_after: f64,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ExecutionReport {
    /// A rejection: nothing filled, position untouched.
    pub fn rejected(
        order: &Order,
        timestamp: DateTime<Utc>,
        code: ErrorCode,
        message: impl Into<String>,
        position_after: f64,
        entry_price_after: Price,
        unrealized_pnl_after: f64,
    ) -> Self {
        Self {
            order_id: order.id,
            timestamp,
            action: order.action,
            requested_size: order.size,
            filled_size: Qty(0.0),
            fill_price: Price(0.0),
            slippage_units: 0.0,
            commission: 0.0,
            position_after,
            entry_price_after,
            realized_pnl_delta: 0.0,
            unrealized_pnl_after,
            status: ExecutionStatus::Rejected,
            error_code: Some(code),
            error_message: Some(message.into()),
        }
    }

    /// An unfilled limit order waiting on its price condition. Not an error.
    pub fn pending(
        order: &Order,
        timestamp: DateTime<Utc>,
        position_after: f64,
        entry_price_after: Price,
        unrealized_pnl_after: f64,
    ) -> Self {
        Self {
            order_id: order.id,
            timestamp,
            action: order.action,
            requested_size: order.size,
            filled_size: Qty(0.0),
            fill_price: Price(0.0),
            slippage_units: 0.0,
            commission: 0.0,
            position_after,
            entry_price_after,
            realized_pnl_delta: 0.0,
            unrealized_pnl_after,
            status: ExecutionStatus::Pending,
            error_code: None,
            error_message: None,
        }
    }

    /// The `Hold` no-op: reported as filled with zero quantity.
    pub fn hold(
        order: &Order,
        timestamp: DateTime<Utc>,
        position_after: f64,
        entry_price_after: Price,
        unrealized_pnl_after: f64,
    ) -> Self {
        Self {
            order_id: order.id,
            timestamp,
            action: order.action,
            requested_size: Qty(0.0),
            filled_size: Qty(0.0),
            fill_price: Price(0.0),
            slippage_units: 0.0,
            commission: 0.0,
            position_after,
            entry_price_after,
            realized_pnl_delta: 0.0,
            unrealized_pnl_after,
            status: ExecutionStatus::Filled,
            error_code: None,
            error_message: None,
        }
    }

    /// Whether this report mutates position and account state when applied.
    pub fn is_applicable(&self) -> bool {
        matches!(
            self.status,
            ExecutionStatus::Filled | ExecutionStatus::Partial
        ) && self.filled_size.0 > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-02T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_rejected_report_fills_nothing() {
        let order = Order::market(OrderId(7), OrderAction::Buy, Qty(1.0), ts());
        let report = ExecutionReport::rejected(
            &order,
            ts(),
            ErrorCode::InsufficientBalance,
            "notional above buying power",
            0.0,
            Price(0.0),
            0.0,
        );
        assert_eq!(report.status, ExecutionStatus::Rejected);
        assert_eq!(report.filled_size, Qty(0.0));
        assert_eq!(report.error_code, Some(ErrorCode::InsufficientBalance));
        assert!(!report.is_applicable());
    }

    #[test]
    fn test_pending_report_carries_no_error() {
        let order = Order::limit(OrderId(8), OrderAction::Buy, Qty(0.5), Price(1.1), ts());
        let report = ExecutionReport::pending(&order, ts(), 0.0, Price(0.0), 0.0);
        assert_eq!(report.status, ExecutionStatus::Pending);
        assert_eq!(report.error_code, None);
        assert!(!report.is_applicable());
    }

    #[test]
    fn test_hold_is_a_filled_noop() {
        let order = Order::hold(OrderId(9), ts());
        let report = ExecutionReport::hold(&order, ts(), 1.5, Price(1.2), 30.0);
        assert_eq!(report.status, ExecutionStatus::Filled);
        assert_eq!(report.filled_size, Qty(0.0));
        assert_eq!(report.position_after, 1.5);
        assert!(!report.is_applicable());
    }
}
