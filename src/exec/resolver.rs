use serde::{Deserialize, Serialize};

use crate::{
    domain::{Price, Qty, Tick},
    error::{ErrorCode, OrderError},
    exec::{
        friction::{FrictionModel, MomentumBand},
        order::{ExecutionReport, ExecutionStatus, Order, OrderAction, OrderType},
    },
    instrument::Instrument,
    portfolio::{account::AccountSnapshot, position::preview_fill, position::PositionSnapshot},
};

/// Session-level order size caps enforced at validation time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderLimits {
    pub max_order_size: f64,
    pub max_position_size: f64,
}

/// Everything the resolver reads besides the order and the tick. The
/// position snapshot is needed to preview the mutation the fill implies;
/// the account snapshot backs the buying-power pre-check.
#[derive(Debug, Clone)]
pub struct ResolveCtx<'a> {
    pub account: &'a AccountSnapshot,
    pub position: &'a PositionSnapshot,
    pub limits: OrderLimits,
    pub supported_types: &'a [OrderType],
    pub band: MomentumBand,
    pub friction: &'a FrictionModel,
}

/// Resolves orders against the current quote. A pure function of its inputs:
/// identical inputs produce identical reports. The only state is the outcome
/// counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderResolver {
    pub resolved: u64,
    pub rejected: u64,
    pub pending: u64,
}

impl OrderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset_counters(&mut self) {
        *self = Self::default();
    }

    #[tracing::instrument(skip_all, fields(order_id = order.id.0, action = %order.action))]
    pub fn resolve(
        &mut self,
        order: &Order,
        tick: &Tick,
        instrument: &Instrument,
        ctx: &ResolveCtx<'_>,
    ) -> ExecutionReport {
        // 1. Hold short-circuits everything.
        if order.action == OrderAction::Hold {
            self.resolved += 1;
            return ExecutionReport::hold(
                order,
                tick.timestamp,
                ctx.position.signed_size,
                ctx.position.average_entry_price,
                ctx.position.unrealized_pnl,
            );
        }

        // 2. Validation gauntlet: first failing check rejects.
        if let Err(err) = self.validate(order, tick, instrument, ctx) {
            self.rejected += 1;
            tracing::warn!(code = err.code().as_str(), reason = err.message(), "order rejected");
            return self.rejection(order, tick, ctx, err);
        }

        // 3. Route by order type to the raw touch price.
        let raw_price = match order.action {
            OrderAction::Buy => tick.ask,
            OrderAction::Sell => tick.bid,
            OrderAction::Hold => unreachable!("handled above"),
        };

        match order.order_type {
            OrderType::Market => {
                // Reasonableness window around the quote; a fill outside it
                // means the quote itself is not tradeable.
                let window = tick.spread() + tick.ask.0 * 0.01;
                if raw_price.0 < tick.bid.0 - window || raw_price.0 > tick.ask.0 + window {
                    self.rejected += 1;
                    return self.rejection(
                        order,
                        tick,
                        ctx,
                        OrderError::rejected(
                            ErrorCode::SlippageExceeded,
                            format!(
                                "fill {} outside window [{}, {}]",
                                raw_price.0,
                                tick.bid.0 - window,
                                tick.ask.0 + window
                            ),
                        ),
                    );
                }
            }
            OrderType::Limit => {
                let limit = order
                    .limit_price
                    .expect("validated: limit orders carry a price");
                let hit = match order.action {
                    OrderAction::Buy => tick.ask.0 <= limit.0,
                    OrderAction::Sell => tick.bid.0 >= limit.0,
                    OrderAction::Hold => unreachable!(),
                };
                if !hit {
                    self.pending += 1;
                    return ExecutionReport::pending(
                        order,
                        tick.timestamp,
                        ctx.position.signed_size,
                        ctx.position.average_entry_price,
                        ctx.position.unrealized_pnl,
                    );
                }
            }
        }

        // 4. Partial-fill sizing against converted depth.
        let depth = instrument.depth_in_units(tick.available_depth());
        if ctx.friction.partial_fills_enabled && depth.0 <= 0.0 {
            self.rejected += 1;
            return self.rejection(
                order,
                tick,
                ctx,
                OrderError::rejected(ErrorCode::NoLiquidity, "no depth quoted on either side"),
            );
        }
        let filled = ctx.friction.fill_size(order.size, depth, tick.volume);
        let status = if filled.0 < order.size.0 {
            ExecutionStatus::Partial
        } else {
            ExecutionStatus::Filled
        };

        // 5. Frictions: commission on the raw touch, then the slippage
        //    adjustment pushes the fill price the adverse way.
        let direction = order.action.direction().expect("Buy or Sell");
        let commission = ctx.friction.commission(instrument, raw_price, filled, direction);
        let slippage_units = ctx.friction.slippage_units(instrument, filled, depth, ctx.band);
        let adjustment = slippage_units * instrument.spec().pip_value * direction.sign();
        let fill_price = Price(raw_price.0 + adjustment);

        // 6. Preview the position mutation; the session applies it. The
        //    post-fill unrealized figure is marked at the fill price itself;
        //    it moves to the quote mid on the next tick's mark pass.
        let preview = preview_fill(
            ctx.position.signed_size,
            ctx.position.average_entry_price,
            order.action,
            filled,
            fill_price,
            fill_price,
            instrument,
        );

        self.resolved += 1;
        ExecutionReport {
            order_id: order.id,
            timestamp: tick.timestamp,
            action: order.action,
            requested_size: order.size,
            filled_size: filled,
            fill_price,
            slippage_units,
            commission,
            position_after: preview.signed_size_after,
            entry_price_after: preview.entry_price_after,
            realized_pnl_delta: preview.realized_pnl_delta,
            unrealized_pnl_after: preview.unrealized_pnl_after,
            status,
            error_code: None,
            error_message: None,
        }
    }

    /// The ordered validation checks of a Buy/Sell order. The first failure
    /// wins.
    fn validate(
        &self,
        order: &Order,
        tick: &Tick,
        instrument: &Instrument,
        ctx: &ResolveCtx<'_>,
    ) -> Result<(), OrderError> {
        if !ctx.supported_types.contains(&order.order_type) {
            return Err(OrderError::rejected(
                ErrorCode::InvalidOrderType,
                format!("order type '{}' not enabled for this session", order.order_type),
            ));
        }

        if order.size.0 <= 0.0 {
            return Err(OrderError::rejected(
                ErrorCode::InvalidOrderSize,
                format!("size must be positive, got {}", order.size.0),
            ));
        }

        instrument.validate_size(order.size)?;

        if order.size.0 > ctx.limits.max_order_size {
            return Err(OrderError::rejected(
                ErrorCode::PositionLimitExceeded,
                format!(
                    "size {} above per-order cap {}",
                    order.size.0, ctx.limits.max_order_size
                ),
            ));
        }

        if order.size.0 > ctx.limits.max_position_size {
            return Err(OrderError::rejected(
                ErrorCode::PositionLimitExceeded,
                format!(
                    "size {} above position cap {}",
                    order.size.0, ctx.limits.max_position_size
                ),
            ));
        }

        let reference_price = match order.order_type {
            OrderType::Limit => {
                let Some(limit) = order.limit_price else {
                    return Err(OrderError::rejected(
                        ErrorCode::InvalidLimitPrice,
                        "limit order without a limit price",
                    ));
                };
                instrument.validate_limit_price(limit)?;
                limit
            }
            OrderType::Market => match order.action {
                OrderAction::Sell => tick.bid,
                _ => tick.ask,
            },
        };

        // Conservative buying-power pre-check, applied only when the order
        // would grow absolute exposure; closing a position must never be
        // blocked by the margin it releases.
        let direction = order.action.direction().expect("Hold handled earlier");
        let exposure_after = ctx.position.signed_size + direction.sign() * order.size.0;
        if exposure_after.abs() > ctx.position.signed_size.abs() {
            let notional = instrument.notional(reference_price, order.size);
            if notional > ctx.account.buying_power {
                return Err(OrderError::rejected(
                    ErrorCode::InsufficientBalance,
                    format!(
                        "notional {:.2} above buying power {:.2}",
                        notional, ctx.account.buying_power
                    ),
                ));
            }
        }

        Ok(())
    }

    fn rejection(
        &self,
        order: &Order,
        tick: &Tick,
        ctx: &ResolveCtx<'_>,
        err: OrderError,
    ) -> ExecutionReport {
        ExecutionReport::rejected(
            order,
            tick.timestamp,
            err.code(),
            err.message().to_string(),
            ctx.position.signed_size,
            ctx.position.average_entry_price,
            ctx.position.unrealized_pnl,
        )
    }
}
