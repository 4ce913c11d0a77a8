mod common;

use common::{
    assert_account_invariants, forex_ticks, frictionless_config, session_over, ticks_with_depth,
    TestStrategy,
};
use ticksim::{
    domain::{Price, Qty},
    error::ErrorCode,
    exec::{ExecutionStatus, Order, OrderAction, OrderId},
    portfolio::AccountStatus,
    session::{EndReason, SessionState},
};

// ================================================================================================
// Market execution
// ================================================================================================

#[test]
fn market_buy_fills_at_ask_and_opens_position() {
    let mut session = session_over(
        frictionless_config(),
        forex_ticks(&[(1.1000, 1.1001), (1.1000, 1.1001)]),
    );
    let mut strategy = TestStrategy::new(|tick, ctx| {
        if tick.sequence == 0 {
            ctx.buy(Qty(1.0));
        }
    });

    let summary = session.run(&mut strategy).unwrap();

    assert_eq!(strategy.executions.len(), 1);
    let report = &strategy.executions[0];
    assert_eq!(report.status, ExecutionStatus::Filled);
    assert_eq!(report.fill_price, Price(1.1001));
    assert_eq!(report.filled_size, Qty(1.0));
    assert_eq!(report.position_after, 1.0);
    assert_eq!(report.entry_price_after, Price(1.1001));
    assert_eq!(report.unrealized_pnl_after, 0.0);
    assert_eq!(report.commission, 0.0);
    assert_eq!(report.slippage_units, 0.0);

    let position = session.position();
    assert_eq!(position.signed_size, 1.0);
    assert_eq!(position.average_entry_price, Price(1.1001));

    assert_eq!(summary.reason, EndReason::EndOfStream);
    assert_eq!(summary.executions, 1);
    assert_account_invariants(&session);
}

#[test]
fn round_trip_realizes_spread_move_and_flattens() {
    // Buy 1.0 at ask 1.1001, sell 1.0 when the bid reaches 1.1050.
    let mut session = session_over(
        frictionless_config(),
        forex_ticks(&[(1.1000, 1.1001), (1.1050, 1.1051), (1.1050, 1.1051)]),
    );
    let mut strategy = TestStrategy::new(|tick, ctx| match tick.sequence {
        0 => {
            ctx.buy(Qty(1.0));
        }
        1 => {
            ctx.sell(Qty(1.0));
        }
        _ => {}
    });

    session.run(&mut strategy).unwrap();

    let sell = &strategy.executions[1];
    assert_eq!(sell.fill_price, Price(1.1050));
    assert!((sell.realized_pnl_delta - 490.0).abs() < 1e-6);
    assert_eq!(sell.position_after, 0.0);

    let position = session.position();
    assert!(position.is_flat());
    assert_eq!(position.unrealized_pnl, 0.0);
    assert!((position.realized_pnl - 490.0).abs() < 1e-6);

    let account = session.account();
    assert!((account.current_balance - 100_490.0).abs() < 1e-6);
    assert_eq!(account.trades, 1);
    assert_eq!(account.winning, 1);
    assert_account_invariants(&session);
}

#[test]
fn buy_then_sell_same_price_is_breakeven() {
    let mut session = session_over(
        frictionless_config(),
        forex_ticks(&[(1.1001, 1.1001), (1.1001, 1.1001), (1.1001, 1.1001)]),
    );
    let mut strategy = TestStrategy::new(|tick, ctx| match tick.sequence {
        0 => {
            ctx.buy(Qty(1.0));
        }
        1 => {
            ctx.sell(Qty(1.0));
        }
        _ => {}
    });

    session.run(&mut strategy).unwrap();

    let position = session.position();
    assert!(position.is_flat());
    assert_eq!(position.realized_pnl, 0.0);

    let account = session.account();
    assert_eq!(account.current_balance, 100_000.0);
    assert_eq!(account.breakeven, 1);
    assert_account_invariants(&session);
}

// ================================================================================================
// Limit orders & holds
// ================================================================================================

#[test]
fn limit_buy_stays_pending_without_mutation() {
    let mut session = session_over(
        frictionless_config(),
        forex_ticks(&[(1.1004, 1.1005), (1.1004, 1.1005)]),
    );
    let mut strategy = TestStrategy::new(|tick, ctx| {
        if tick.sequence == 0 {
            ctx.buy_limit(Qty(0.5), Price(1.1000));
        }
    });

    session.run(&mut strategy).unwrap();

    assert_eq!(strategy.executions.len(), 1);
    let report = &strategy.executions[0];
    assert_eq!(report.status, ExecutionStatus::Pending);
    assert_eq!(report.filled_size, Qty(0.0));
    assert_eq!(report.error_code, None);

    assert!(session.position().is_flat());
    assert_eq!(session.account().current_balance, 100_000.0);
    // Pending is not an error: nothing lands in the error log.
    assert!(session.error_log().is_empty());
    assert_eq!(session.metrics().pending_orders, 1);
}

#[test]
fn unfilled_limits_are_not_retried_without_resubmission() {
    // The ask never reaches the limit; one submission means one pending
    // report, however many ticks follow.
    let mut session = session_over(
        frictionless_config(),
        forex_ticks(&[(1.1004, 1.1005), (1.1003, 1.1004), (1.1002, 1.1003)]),
    );
    let mut strategy = TestStrategy::new(|tick, ctx| {
        if tick.sequence == 0 {
            ctx.buy_limit(Qty(0.5), Price(1.1000));
        }
    });

    session.run(&mut strategy).unwrap();
    assert_eq!(strategy.executions.len(), 1);
    assert_eq!(session.execution_history().len(), 1);
}

#[test]
fn hold_order_changes_nothing() {
    let mut session = session_over(
        frictionless_config(),
        forex_ticks(&[(1.1000, 1.1001), (1.1000, 1.1001)]),
    );
    let mut strategy = TestStrategy::new(|tick, ctx| {
        if tick.sequence == 0 {
            ctx.submit(Order::hold(OrderId(99), tick.timestamp));
        }
    });

    session.run(&mut strategy).unwrap();

    let report = &strategy.executions[0];
    assert_eq!(report.status, ExecutionStatus::Filled);
    assert_eq!(report.filled_size, Qty(0.0));
    assert!(session.position().is_flat());
    assert_eq!(session.account().current_balance, 100_000.0);
    assert_eq!(session.metrics().executions, 0);
}

// ================================================================================================
// Frictions through the session
// ================================================================================================

#[test]
fn partial_fill_caps_by_depth_and_volume_band() {
    let mut config = frictionless_config();
    config.execution.partial_fills.enabled = true;
    config.account.initial_balance = 10_000_000.0;

    // 500k units of quoted depth = 0.5 lots; 1.5M tape volume = 0.9×.
    let mut session = session_over(
        config,
        ticks_with_depth(&[(1.1000, 1.1001), (1.1000, 1.1001)], 500_000.0, 1_500_000.0),
    );
    let mut strategy = TestStrategy::new(|tick, ctx| {
        if tick.sequence == 0 {
            ctx.buy(Qty(2.0));
        }
    });

    session.run(&mut strategy).unwrap();

    let report = &strategy.executions[0];
    assert_eq!(report.status, ExecutionStatus::Partial);
    assert!((report.filled_size.0 - 0.45).abs() < 1e-12);
    assert_eq!(report.requested_size, Qty(2.0));
    assert!((session.position().signed_size - 0.45).abs() < 1e-12);
    assert_account_invariants(&session);
}

#[test]
fn zero_depth_with_partial_fills_rejects_no_liquidity() {
    let mut config = frictionless_config();
    config.execution.partial_fills.enabled = true;

    let mut session = session_over(
        config,
        ticks_with_depth(&[(1.1000, 1.1001)], 0.0, 1_000_000.0),
    );
    let mut strategy = TestStrategy::new(|tick, ctx| {
        if tick.sequence == 0 {
            ctx.buy(Qty(1.0));
        }
    });

    session.run(&mut strategy).unwrap();

    let report = &strategy.executions[0];
    assert_eq!(report.status, ExecutionStatus::Rejected);
    assert_eq!(report.error_code, Some(ErrorCode::NoLiquidity));
    assert_eq!(report.filled_size, Qty(0.0));
    assert_eq!(strategy.errors.len(), 1);
    assert_eq!(strategy.errors[0].code, ErrorCode::NoLiquidity);
    assert!(session.position().is_flat());
}

#[test]
fn commission_reduces_balance_via_identity() {
    let mut config = frictionless_config();
    config.execution.commission.enabled = true;

    let mut session = session_over(
        config,
        forex_ticks(&[(1.1000, 1.1001), (1.1000, 1.1001)]),
    );
    let mut strategy = TestStrategy::new(|tick, ctx| {
        if tick.sequence == 0 {
            ctx.buy(Qty(1.0));
        }
    });

    session.run(&mut strategy).unwrap();

    let report = &strategy.executions[0];
    // Per-million scheme: 1.1001 × 1 lot × 100k notional at 50/M.
    let expected = 1.1001 * 100_000.0 / 1_000_000.0 * 50.0;
    assert!((report.commission - expected).abs() < 1e-9);

    let account = session.account();
    assert!((account.commission_paid - expected).abs() < 1e-9);
    assert!((account.current_balance - (100_000.0 - expected)).abs() < 1e-9);
    assert_account_invariants(&session);
}

// ================================================================================================
// Account lifecycle
// ================================================================================================

#[test]
fn drawdown_breach_blows_account_and_stops_session() {
    let mut config = frictionless_config();
    config.account.max_drawdown_percent = 20.0;
    config.account.leverage = 2.0;

    // Buy 1 lot at 1.30010, sell it 0.20001 lower: realized −20001 on a
    // 100k account is 20.001% drawdown, just over the limit.
    let mut session = session_over(
        config,
        forex_ticks(&[
            (1.3000, 1.30010),
            (1.10009, 1.10010),
            (1.10009, 1.10010),
            (1.10009, 1.10010),
        ]),
    );
    let mut strategy = TestStrategy::new(|tick, ctx| match tick.sequence {
        0 => {
            ctx.buy(Qty(1.0));
        }
        1 => {
            ctx.sell(Qty(1.0));
        }
        _ => {}
    });

    let summary = session.run(&mut strategy).unwrap();

    assert_eq!(summary.reason, EndReason::AccountBlown);
    assert_eq!(summary.account_status, AccountStatus::Blown);
    assert!((session.account().current_balance - 79_999.0).abs() < 1e-6);
    assert!(session.is_account_blown());
    assert_eq!(session.state(), SessionState::Stopped);

    // Blown within the same tick: the third and fourth quotes never reach
    // the strategy.
    assert_eq!(strategy.seen_sequences, vec![0, 1]);
    // Session end fires exactly once.
    assert_eq!(strategy.summaries.len(), 1);
    // The blow-up is in the error log as the one fatal code.
    assert!(strategy
        .errors
        .iter()
        .any(|record| record.code == ErrorCode::AccountBlown));
    // Status change dispatched.
    assert!(strategy
        .transitions
        .iter()
        .any(|transition| transition.to == AccountStatus::Blown));
    assert_account_invariants(&session);
}

#[test]
fn one_tick_before_the_limit_is_at_limit() {
    let mut config = frictionless_config();
    config.account.max_drawdown_percent = 20.0;
    config.account.leverage = 2.0;

    // Exactly −20000 on 100k: drawdown 20.000%, not over the limit.
    let mut session = session_over(
        config,
        forex_ticks(&[(1.3000, 1.30010), (1.10010, 1.10011), (1.10010, 1.10011)]),
    );
    let mut strategy = TestStrategy::new(|tick, ctx| match tick.sequence {
        0 => {
            ctx.buy(Qty(1.0));
        }
        1 => {
            ctx.sell(Qty(1.0));
        }
        _ => {}
    });

    let summary = session.run(&mut strategy).unwrap();

    assert_eq!(session.account().status, AccountStatus::AtLimit);
    assert!(!session.is_account_blown());
    // The session ran to the end of the stream.
    assert_eq!(summary.reason, EndReason::EndOfStream);
    assert_eq!(strategy.seen_sequences, vec![0, 1, 2]);
}

#[test]
fn close_positions_at_end_flattens_through_the_resolver() {
    let mut config = frictionless_config();
    config.session.close_positions_at_end = true;

    let mut session = session_over(
        config,
        forex_ticks(&[(1.1000, 1.1001), (1.1050, 1.1051)]),
    );
    let mut strategy = TestStrategy::new(|tick, ctx| {
        if tick.sequence == 0 {
            ctx.buy(Qty(1.0));
        }
    });

    session.run(&mut strategy).unwrap();

    assert!(session.position().is_flat());
    let history = session.execution_history();
    assert_eq!(history.len(), 2);
    let close = &history[1];
    assert_eq!(close.action, OrderAction::Sell);
    // Flattened at the final bid.
    assert_eq!(close.fill_price, Price(1.1050));
    assert!((session.account().total_realized_pnl - 490.0).abs() < 1e-6);
    assert_account_invariants(&session);
}

// ================================================================================================
// Ordering & history invariants
// ================================================================================================

#[test]
fn sequences_are_strictly_increasing_and_orders_resolve_in_submission_order() {
    let mut session = session_over(
        frictionless_config(),
        forex_ticks(&[(1.1000, 1.1001), (1.1002, 1.1003), (1.1004, 1.1005)]),
    );
    let mut strategy = TestStrategy::new(|tick, ctx| {
        if tick.sequence == 1 {
            // Two orders on the same tick: applied in submission order.
            ctx.buy(Qty(1.0));
            ctx.buy(Qty(2.0));
        }
    });

    session.run(&mut strategy).unwrap();

    assert!(strategy
        .seen_sequences
        .windows(2)
        .all(|w| w[1] > w[0]));

    let history = session.execution_history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].filled_size, Qty(1.0));
    assert_eq!(history[1].filled_size, Qty(2.0));
    // Both resolved against the same tick.
    assert_eq!(history[0].timestamp, history[1].timestamp);
    // The second order saw the first one's position.
    assert_eq!(history[0].position_after, 1.0);
    assert_eq!(history[1].position_after, 3.0);
}

#[test]
fn filled_never_exceeds_requested_and_rejections_fill_zero() {
    let mut config = frictionless_config();
    config.execution.partial_fills.enabled = true;
    config.account.initial_balance = 2_000.0;
    config.account.leverage = 1.0;

    let mut session = session_over(
        config,
        ticks_with_depth(&[(1.1000, 1.1001), (1.1000, 1.1001)], 300_000.0, 100_000.0),
    );
    let mut strategy = TestStrategy::new(|tick, ctx| {
        if tick.sequence == 0 {
            ctx.buy(Qty(0.5)); // rejected: notional above buying power
            ctx.buy(Qty(0.01)); // partial-capped fill
        }
    });

    session.run(&mut strategy).unwrap();

    for report in session.execution_history() {
        assert!(report.filled_size.0 <= report.requested_size.0 + 1e-12);
        match report.status {
            ExecutionStatus::Rejected => assert_eq!(report.filled_size, Qty(0.0)),
            ExecutionStatus::Filled => {
                assert_eq!(report.filled_size, report.requested_size)
            }
            ExecutionStatus::Partial => {
                assert!(report.filled_size.0 > 0.0);
                assert!(report.filled_size.0 < report.requested_size.0);
            }
            ExecutionStatus::Pending => assert_eq!(report.filled_size, Qty(0.0)),
        }
    }
    assert_eq!(session.metrics().rejections, 1);
    assert_account_invariants(&session);
}

// ================================================================================================
// Determinism
// ================================================================================================

#[test]
fn reset_and_rerun_reproduce_identical_histories() {
    let quotes: Vec<(f64, f64)> = (0..50)
        .map(|i| {
            let drift = (i as f64) * 0.0002 * if i % 3 == 0 { -1.0 } else { 1.0 };
            (1.1000 + drift, 1.1001 + drift)
        })
        .collect();

    let mut config = frictionless_config();
    config.execution.slippage.enabled = true;
    config.execution.commission.enabled = true;
    config.execution.partial_fills.enabled = true;

    let mut session = session_over(config, forex_ticks(&quotes));

    let mut act = |tick: &ticksim::Tick, ctx: &mut ticksim::TickCtx| match tick.sequence % 10 {
        2 => {
            ctx.buy(Qty(0.5));
        }
        7 => {
            ctx.sell(Qty(0.5));
        }
        _ => {}
    };

    let (first_history, first_account) = {
        let mut strategy = TestStrategy::new(&mut act);
        session.run(&mut strategy).unwrap();
        (session.execution_history(), session.account())
    };

    session.reset().unwrap();
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.account().current_balance, 100_000.0);
    assert!(session.execution_history().is_empty());

    let mut second_strategy = TestStrategy::new(&mut act);
    session.run(&mut second_strategy).unwrap();

    assert_eq!(first_history, session.execution_history());
    assert_eq!(first_account, session.account());
}
