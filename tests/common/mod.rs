#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};

use ticksim::{
    config::SimConfig,
    domain::{Price, Qty, Tick},
    error::ErrorRecord,
    exec::ExecutionReport,
    portfolio::StatusTransition,
    session::{Session, SessionSummary, Strategy, TickCtx},
    VecFeed,
};

pub fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-06-02T09:30:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// One tick per `(bid, ask)` pair, a second apart, with deep books and
/// active tape so the friction calculators stay out of the way unless a
/// test asks for them.
pub fn forex_ticks(quotes: &[(f64, f64)]) -> Vec<Tick> {
    ticks_with_depth(quotes, 5_000_000.0, 3_000_000.0)
}

pub fn ticks_with_depth(quotes: &[(f64, f64)], qty: f64, volume: f64) -> Vec<Tick> {
    quotes
        .iter()
        .enumerate()
        .map(|(i, &(bid, ask))| Tick {
            timestamp: base_time() + Duration::seconds(i as i64),
            bid: Price(bid),
            ask: Price(ask),
            bid_qty: Qty(qty),
            ask_qty: Qty(qty),
            last_price: Price((bid + ask) / 2.0),
            volume: Qty(volume),
            sequence: 0,
        })
        .collect()
}

/// Frictionless leveraged forex setup: every execution knob off, pacing off,
/// no end-of-session flatten. Tests opt individual frictions back in.
pub fn frictionless_config() -> SimConfig {
    let mut config = SimConfig::default();
    config.execution.slippage.enabled = false;
    config.execution.commission.enabled = false;
    config.execution.partial_fills.enabled = false;
    config.account.initial_balance = 100_000.0;
    config.account.leverage = 30.0;
    config.account.max_position_size = 50.0;
    config.account.max_drawdown_percent = 90.0;
    config.session.close_positions_at_end = false;
    config.speed.multiplier = 10_000.0;
    config
}

pub fn session_over(config: SimConfig, ticks: Vec<Tick>) -> Session {
    Session::builder(config)
        .with_feed(VecFeed::new(ticks))
        .build()
        .expect("session builds")
}

/// Strategy harness: runs the given closure per tick and records every
/// callback for later assertions.
pub struct TestStrategy<F: FnMut(&Tick, &mut TickCtx)> {
    act: F,
    pub seen_sequences: Vec<u64>,
    pub executions: Vec<ExecutionReport>,
    pub errors: Vec<ErrorRecord>,
    pub transitions: Vec<StatusTransition>,
    pub summaries: Vec<SessionSummary>,
}

impl<F: FnMut(&Tick, &mut TickCtx)> TestStrategy<F> {
    pub fn new(act: F) -> Self {
        Self {
            act,
            seen_sequences: Vec::new(),
            executions: Vec::new(),
            errors: Vec::new(),
            transitions: Vec::new(),
            summaries: Vec::new(),
        }
    }
}

impl<F: FnMut(&Tick, &mut TickCtx)> Strategy for TestStrategy<F> {
    fn on_tick(&mut self, tick: &Tick, ctx: &mut TickCtx) {
        self.seen_sequences.push(tick.sequence);
        (self.act)(tick, ctx);
    }

    fn on_execution(&mut self, report: &ExecutionReport) {
        self.executions.push(report.clone());
    }

    fn on_error(&mut self, record: &ErrorRecord) {
        self.errors.push(record.clone());
    }

    fn on_status_change(&mut self, transition: StatusTransition) {
        self.transitions.push(transition);
    }

    fn on_session_end(&mut self, summary: &SessionSummary) {
        self.summaries.push(summary.clone());
    }
}

/// Asserts the universal account identity and water-mark ordering.
pub fn assert_account_invariants(session: &Session) {
    let account = session.account();
    let identity =
        account.initial_balance + account.total_realized_pnl - account.commission_paid;
    assert!(
        (account.current_balance - identity).abs() < 1e-6,
        "balance identity violated: {} vs {}",
        account.current_balance,
        identity
    );
    assert!(account.high_water_mark >= account.current_balance - 1e-9);
    assert!(account.current_balance >= account.low_water_mark - 1e-9);
}
