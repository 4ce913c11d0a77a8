use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::json;

use crate::{
    bounded_log::BoundedLog,
    config::SimConfig,
    domain::{Qty, Tick, TickValidator},
    error::{ErrorCode, ErrorRecord, SessionError, SimResult},
    exec::{
        friction::{FrictionModel, MomentumTracker},
        order::{ExecutionReport, ExecutionStatus, Order, OrderAction, OrderId, OrderType},
        resolver::{OrderLimits, OrderResolver, ResolveCtx},
    },
    feed::{FeedCounters, FeedEvent, TickFeed},
    instrument::Instrument,
    portfolio::{
        account::{Account, AccountSnapshot, StatusTransition},
        position::{Position, PositionSnapshot},
    },
    session::{
        monitor::SessionMonitor, strategy::Strategy, strategy::TickCtx, EndReason,
        MetricsSnapshot, SessionState, SessionSummary,
    },
};

/// Retained execution reports and error-log entries.
pub const HISTORY_CAPACITY: usize = 10_000;

/// Speed multipliers at or above this skip pacing sleeps entirely.
const FULL_SPEED_MULTIPLIER: f64 = 1000.0;

/// Inter-tick gaps above this are treated as data gaps, not pacing targets.
const MAX_TICK_GAP: Duration = Duration::from_secs(60);

/// Mutable state observable from outside the loop. The loop takes the write
/// guard around each tick's mutation block; external readers (monitors) take
/// read guards and receive copies.
pub(crate) struct SharedState {
    pub state: SessionState,
    pub tick_count: u64,
    pub current_tick: Option<Tick>,
    pub account: Account,
    pub position: Position,
    pub execution_history: BoundedLog<ExecutionReport>,
    pub error_log: BoundedLog<ErrorRecord>,
    pub executions: u64,
    pub rejections: u64,
    pub pending_orders: u64,
    pub feed: FeedCounters,
    pub started_at: Option<DateTime<Utc>>,
    pub summary: Option<SessionSummary>,
}

impl SharedState {
    pub(crate) fn metrics(&self) -> MetricsSnapshot {
        let account = self.account.snapshot();
        MetricsSnapshot {
            state: self.state,
            tick_count: self.tick_count,
            feed: self.feed,
            executions: self.executions,
            rejections: self.rejections,
            pending_orders: self.pending_orders,
            balance: account.current_balance,
            equity: account.current_balance + account.total_unrealized_pnl,
            realized_pnl: account.total_realized_pnl,
            unrealized_pnl: account.total_unrealized_pnl,
            commission_paid: account.commission_paid,
            drawdown_percent: account.drawdown_percent,
            max_drawdown_experienced: account.max_drawdown_experienced,
            trades: account.trades,
            winning: account.winning,
            losing: account.losing,
            breakeven: account.breakeven,
            consecutive_wins: account.consecutive_wins,
            consecutive_losses: account.consecutive_losses,
            account_status: account.status,
            execution_history_len: self.execution_history.len(),
            error_log_len: self.error_log.len(),
        }
    }
}

// ================================================================================================
// Session
// ================================================================================================

/// The simulation kernel: owns the tick loop, the state machine, and all
/// mutable trading state for one replay.
///
/// Two driving shapes share the same machinery:
/// - the auto-loop [`Session::run`], which owns the loop and dispatches
///   [`Strategy`] callbacks, and
/// - the pull API ([`Session::next_tick`] + [`Session::execute_order`]),
///   where the caller owns the loop.
///
/// The loop is single-threaded and cooperative: ticks, callbacks, order
/// resolution, and state mutation all happen on the caller's thread. The
/// only suspension points are the backing store read and the pacing sleep.
pub struct Session {
    instrument: Instrument,
    friction: FrictionModel,
    limits: OrderLimits,
    supported_types: Vec<OrderType>,
    validator: TickValidator,
    close_positions_at_end: bool,
    speed_multiplier: f64,
    feed: Box<dyn TickFeed>,
    resolver: OrderResolver,
    momentum: MomentumTracker,
    shared: Arc<RwLock<SharedState>>,
    initial_account: Account,
    stop_requested: bool,
    finishing: bool,
    prev_tick_time: Option<DateTime<Utc>>,
    tick_started: Option<Instant>,
    run_started: Option<Instant>,
    next_order_id: u64,
    pending_errors: Vec<ErrorRecord>,
}

impl Session {
    pub fn builder(config: SimConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    // ============================================================================================
    // State machine
    // ============================================================================================

    pub fn state(&self) -> SessionState {
        self.shared.read().state
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn is_account_blown(&self) -> bool {
        self.shared.read().account.status().is_blown()
    }

    /// Idle → Running. Emits the session-start event.
    #[tracing::instrument(skip(self), fields(symbol = %self.instrument.symbol()))]
    pub fn start(&mut self) -> SimResult<()> {
        let mut guard = self.shared.write();
        if !guard.state.is_idle() {
            return Err(SessionError::InvalidState(format!(
                "start() requires Idle, session is {}",
                guard.state
            ))
            .into());
        }
        guard.state = SessionState::Running;
        guard.started_at = Some(Utc::now());
        drop(guard);

        self.run_started = Some(Instant::now());
        tracing::info!(
            kind = %self.instrument.kind(),
            speed = self.speed_multiplier,
            "session started"
        );
        Ok(())
    }

    /// Requests a stop. Idempotent; the loop observes the flag at its next
    /// iteration boundary and transitions to Stopped there. In-flight reads
    /// and sleeps complete normally.
    pub fn stop(&mut self) {
        if self.is_running() && !self.stop_requested {
            self.stop_requested = true;
            tracing::info!("stop requested");
        }
    }

    /// Stopped (or Idle) → Idle: restores the account, position, counters,
    /// and the feed to their initial values, so a rerun over the same data
    /// reproduces the same execution history.
    pub fn reset(&mut self) -> SimResult<()> {
        self.observe_stop()?;
        {
            let guard = self.shared.read();
            if guard.state.is_running() {
                return Err(SessionError::InvalidState(
                    "reset() requires Idle or Stopped; call stop() first".to_string(),
                )
                .into());
            }
        }

        self.feed.reset()?;
        self.resolver.reset_counters();
        self.momentum.clear();
        self.stop_requested = false;
        self.finishing = false;
        self.prev_tick_time = None;
        self.tick_started = None;
        self.run_started = None;
        self.next_order_id = 1;
        self.pending_errors.clear();

        let mut guard = self.shared.write();
        guard.state = SessionState::Idle;
        guard.tick_count = 0;
        guard.current_tick = None;
        guard.account = self.initial_account.clone();
        guard.position = Position::new(self.instrument.symbol());
        guard.execution_history.clear();
        guard.error_log.clear();
        guard.executions = 0;
        guard.rejections = 0;
        guard.pending_orders = 0;
        guard.feed = FeedCounters::default();
        guard.started_at = None;
        guard.summary = None;

        tracing::info!("session reset");
        Ok(())
    }

    // ============================================================================================
    // Auto-loop
    // ============================================================================================

    /// Runs the whole replay, dispatching strategy callbacks per tick, and
    /// returns the summary that was also handed to `on_session_end`.
    pub fn run(&mut self, strategy: &mut dyn Strategy) -> SimResult<SessionSummary> {
        self.start()?;

        'ticks: while self.is_running() && !self.stop_requested {
            let Some(tick) = self.advance()? else { break };
            self.drain_errors(strategy);

            let mut ctx = self.tick_ctx(&tick);
            strategy.on_tick(&tick, &mut ctx);
            let (orders, next_id) = ctx.into_orders();
            self.next_order_id = next_id;

            for order in orders {
                let (report, transition) = self.submit(order)?;
                strategy.on_execution(&report);
                self.drain_errors(strategy);
                if transition.changed() {
                    strategy.on_status_change(transition);
                }
                if transition.blew_up() {
                    break 'ticks;
                }
            }
            if self.stop_requested {
                break;
            }

            self.pace(tick.timestamp);
        }

        let summary = self.finish(self.end_reason())?;
        self.drain_errors(strategy);
        strategy.on_session_end(&summary);
        Ok(summary)
    }

    // ============================================================================================
    // Pull API
    // ============================================================================================

    /// Advances to the next tick: marks the position and account against it
    /// and makes it current. Returns `None` once the stream ends or a stop
    /// was observed, at which point the session is Stopped and the summary
    /// is available.
    pub fn next_tick(&mut self) -> SimResult<Option<Tick>> {
        self.observe_stop()?;
        match self.state() {
            SessionState::Running => {}
            SessionState::Stopped => return Ok(None),
            SessionState::Idle => {
                return Err(SessionError::InvalidState(
                    "next_tick() requires start() first".to_string(),
                )
                .into());
            }
        }
        match self.advance()? {
            Some(tick) => Ok(Some(tick)),
            None => {
                self.finish(self.end_reason())?;
                Ok(None)
            }
        }
    }

    /// Resolves one order against the current tick and applies the outcome.
    pub fn execute_order(&mut self, order: Order) -> SimResult<ExecutionReport> {
        if !self.is_running() {
            return Err(SessionError::InvalidState(
                "execute_order() requires a Running session".to_string(),
            )
            .into());
        }
        let (report, _) = self.submit(order)?;
        Ok(report)
    }

    // ============================================================================================
    // Snapshots & accessors
    // ============================================================================================

    pub fn position(&self) -> PositionSnapshot {
        self.shared.read().position.snapshot()
    }

    pub fn account(&self) -> AccountSnapshot {
        self.shared.read().account.snapshot()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.read().metrics()
    }

    pub fn current_tick(&self) -> Option<Tick> {
        self.shared.read().current_tick
    }

    pub fn tick_count(&self) -> u64 {
        self.shared.read().tick_count
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

    pub fn feed_counters(&self) -> FeedCounters {
        self.feed.counters()
    }

    /// Cloneable read-only handle for other threads.
    pub fn monitor(&self) -> SessionMonitor {
        SessionMonitor::new(Arc::clone(&self.shared))
    }

    pub fn speed_multiplier(&self) -> f64 {
        self.speed_multiplier
    }

    /// Adjusts replay pacing. Accepted range: `[0.1, 10000]`.
    pub fn set_speed(&mut self, multiplier: f64) -> SimResult<()> {
        if !(0.1..=10_000.0).contains(&multiplier) {
            return Err(crate::error::ConfigError::SpeedOutOfRange(multiplier).into());
        }
        self.speed_multiplier = multiplier;
        Ok(())
    }

    // ============================================================================================
    // Loop internals
    // ============================================================================================

    /// Steps 1–5 of the tick loop: fetch, validate, momentum, mark. Parse
    /// errors are logged and skipped; `None` means the stream is done or a
    /// stop was observed.
    fn advance(&mut self) -> SimResult<Option<Tick>> {
        loop {
            if self.stop_requested {
                return Ok(None);
            }
            if !self.feed.has_next() {
                return Ok(None);
            }
            match self.feed.next() {
                FeedEvent::EndOfStream => return Ok(None),
                FeedEvent::ParseError { line, reason } => {
                    tracing::warn!(line, reason = %reason, "bad record skipped");
                    let record = ErrorRecord::new(
                        ErrorCode::CsvReadError,
                        format!("row {line}: {reason}"),
                        Utc::now(),
                        module_path!(),
                    )
                    .with_details(json!({ "line": line }));
                    let mut guard = self.shared.write();
                    guard.error_log.push(record.clone());
                    guard.feed = self.feed.counters();
                    drop(guard);
                    self.pending_errors.push(record);
                    continue;
                }
                FeedEvent::Tick(tick) => {
                    if let Err(e) = self.validator.validate(&tick) {
                        tracing::debug!(sequence = tick.sequence, reason = %e, "tick rejected");
                        continue;
                    }
                    self.tick_started = Some(Instant::now());
                    self.momentum.observe(tick.mid());

                    let mut guard = self.shared.write();
                    guard.current_tick = Some(tick);
                    guard.tick_count += 1;
                    guard.position.mark(&tick, &self.instrument);
                    let position = guard.position.snapshot();
                    guard.account.mark(&position);
                    guard.feed = self.feed.counters();
                    return Ok(Some(tick));
                }
            }
        }
    }

    /// Step 7 for one order: resolve, apply, record, and react to account
    /// status. The report always lands in the execution history.
    fn submit(&mut self, order: Order) -> SimResult<(ExecutionReport, StatusTransition)> {
        let mut guard = self.shared.write();
        let tick = guard.current_tick.ok_or(SessionError::NoCurrentTick)?;

        let account_snapshot = guard.account.snapshot();
        let position_snapshot = guard.position.snapshot();
        let band = self
            .momentum
            .band(self.instrument.spec().typical_volatility);
        let ctx = ResolveCtx {
            account: &account_snapshot,
            position: &position_snapshot,
            limits: self.limits,
            supported_types: &self.supported_types,
            band,
            friction: &self.friction,
        };
        let report = self
            .resolver
            .resolve(&order, &tick, &self.instrument, &ctx);

        let mut transition = StatusTransition {
            from: guard.account.status(),
            to: guard.account.status(),
        };

        match report.status {
            ExecutionStatus::Rejected => {
                guard.rejections += 1;
                let code = report.error_code.unwrap_or(ErrorCode::InvalidOrderType);
                let record = ErrorRecord::new(
                    code,
                    report
                        .error_message
                        .clone()
                        .unwrap_or_else(|| code.to_string()),
                    tick.timestamp,
                    module_path!(),
                )
                .with_details(json!({
                    "order_id": order.id.0,
                    "requested_size": order.size.0,
                }));
                guard.error_log.push(record.clone());
                self.pending_errors.push(record);
            }
            ExecutionStatus::Pending => {
                guard.pending_orders += 1;
            }
            _ if report.is_applicable() => {
                guard.position.apply(&report, &self.instrument)?;
                let position = guard.position.snapshot();
                transition = guard.account.apply(&report, &position);
                guard.executions += 1;
            }
            _ => {}
        }

        guard.execution_history.push(report.clone());

        if transition.blew_up() {
            let record = ErrorRecord::new(
                ErrorCode::AccountBlown,
                format!(
                    "drawdown {:.3}% breached limit {:.3}%",
                    guard.account.snapshot().drawdown_percent,
                    guard.account.snapshot().max_drawdown_percent
                ),
                tick.timestamp,
                module_path!(),
            );
            guard.error_log.push(record.clone());
            self.pending_errors.push(record);
        }
        drop(guard);

        if transition.blew_up() {
            self.finish(EndReason::AccountBlown)?;
        }

        Ok((report, transition))
    }

    /// Builds the per-tick callback context from fresh snapshots.
    fn tick_ctx(&self, tick: &Tick) -> TickCtx {
        let guard = self.shared.read();
        TickCtx::new(
            tick.timestamp,
            guard.position.snapshot(),
            guard.account.snapshot(),
            guard.metrics(),
            self.next_order_id,
        )
    }

    fn drain_errors(&mut self, strategy: &mut dyn Strategy) {
        for record in std::mem::take(&mut self.pending_errors) {
            strategy.on_error(&record);
        }
    }

    fn end_reason(&self) -> EndReason {
        if self.is_account_blown() {
            EndReason::AccountBlown
        } else if self.stop_requested {
            EndReason::StopRequested
        } else {
            EndReason::EndOfStream
        }
    }

    /// Observes a pending stop request outside the loop: a boundary for the
    /// pull API, so `stop(); reset()` behaves.
    fn observe_stop(&mut self) -> SimResult<()> {
        if self.stop_requested && self.is_running() {
            self.finish(EndReason::StopRequested)?;
        }
        Ok(())
    }

    /// Running → Stopped. Optionally flattens the open position through the
    /// normal execution path, assembles the summary, and emits the
    /// session-end event. Idempotent.
    fn finish(&mut self, reason: EndReason) -> SimResult<SessionSummary> {
        if let Some(summary) = self.summary() {
            return Ok(summary);
        }
        if !self.finishing {
            self.finishing = true;
            if self.close_positions_at_end {
                self.flatten()?;
            }
            // The flatten can itself end the session (a blown account inside
            // submit); its summary wins.
            if let Some(summary) = self.summary() {
                return Ok(summary);
            }
        }

        let mut guard = self.shared.write();
        guard.state = SessionState::Stopped;
        guard.feed = self.feed.counters();
        let account = guard.account.snapshot();
        let summary = SessionSummary {
            reason,
            ticks_processed: guard.tick_count,
            executions: guard.executions,
            rejections: guard.rejections,
            pending_orders: guard.pending_orders,
            feed: guard.feed,
            final_balance: account.current_balance,
            realized_pnl: account.total_realized_pnl,
            unrealized_pnl: account.total_unrealized_pnl,
            commission_paid: account.commission_paid,
            max_drawdown_experienced: account.max_drawdown_experienced,
            trades: account.trades,
            winning: account.winning,
            losing: account.losing,
            breakeven: account.breakeven,
            account_status: account.status,
            started_at: guard.started_at,
            ended_at: Utc::now(),
            wall_time_ms: self
                .run_started
                .map(|t| t.elapsed().as_millis() as u64)
                .unwrap_or(0),
        };
        guard.summary = Some(summary.clone());
        drop(guard);

        tracing::info!(
            reason = %reason,
            ticks = summary.ticks_processed,
            executions = summary.executions,
            final_balance = summary.final_balance,
            "session ended"
        );
        Ok(summary)
    }

    /// Synthesizes a closing market order for any open position, routed
    /// through the resolver like any strategy order so the close shows up in
    /// the execution history with its frictions.
    fn flatten(&mut self) -> SimResult<()> {
        let (signed, tick) = {
            let guard = self.shared.read();
            (guard.position.signed_size(), guard.current_tick)
        };
        if signed == 0.0 {
            return Ok(());
        }
        let Some(tick) = tick else {
            return Ok(());
        };

        let action = if signed > 0.0 {
            OrderAction::Sell
        } else {
            OrderAction::Buy
        };
        let order = Order::market(
            OrderId(self.next_order_id),
            action,
            Qty(signed.abs()),
            tick.timestamp,
        );
        self.next_order_id += 1;

        tracing::info!(size = signed.abs(), action = %action, "flattening position at session end");
        let (report, _) = self.submit(order)?;
        if report.status == ExecutionStatus::Rejected {
            tracing::warn!(
                code = ?report.error_code,
                "end-of-session flatten was rejected; position left open"
            );
        }
        Ok(())
    }

    /// Step 9: replay pacing. The base period is the gap between consecutive
    /// tick timestamps; at high multipliers the sleep is skipped outright.
    fn pace(&mut self, tick_time: DateTime<Utc>) {
        let prev = self.prev_tick_time.replace(tick_time);
        if self.speed_multiplier >= FULL_SPEED_MULTIPLIER {
            return;
        }
        let Some(prev) = prev else { return };

        let base = (tick_time - prev).to_std().unwrap_or(Duration::ZERO);
        let base = base.min(MAX_TICK_GAP);
        let target = base.div_f64(self.speed_multiplier);
        let elapsed = self
            .tick_started
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO);
        if target > elapsed {
            std::thread::sleep(target - elapsed);
        }
    }
}

// ================================================================================================
// Building
// ================================================================================================

/// Assembles a [`Session`] from a validated configuration, optionally with
/// an injected feed (anything implementing [`TickFeed`]) instead of the
/// CSV source named in the config.
pub struct SessionBuilder {
    config: SimConfig,
    feed: Option<Box<dyn TickFeed>>,
}

impl SessionBuilder {
    pub fn new(config: SimConfig) -> Self {
        Self { config, feed: None }
    }

    pub fn with_feed(mut self, feed: impl TickFeed + 'static) -> Self {
        self.feed = Some(Box::new(feed));
        self
    }

    pub fn build(self) -> SimResult<Session> {
        let Self { config, feed } = self;
        config.validate()?;

        let instrument = config.instrument.build();
        let validator = config.data.validator();
        let feed: Box<dyn TickFeed> = match feed {
            Some(feed) => feed,
            None => Box::new(config.data.open_csv()?),
        };

        let account = Account::new(
            config.account.initial_balance,
            config.account.currency.clone(),
            config.account.leverage,
            config.account.max_drawdown_percent,
        );
        let position = Position::new(instrument.symbol());

        let shared = SharedState {
            state: SessionState::Idle,
            tick_count: 0,
            current_tick: None,
            account: account.clone(),
            position,
            execution_history: BoundedLog::new(HISTORY_CAPACITY),
            error_log: BoundedLog::new(HISTORY_CAPACITY),
            executions: 0,
            rejections: 0,
            pending_orders: 0,
            feed: FeedCounters::default(),
            started_at: None,
            summary: None,
        };

        Ok(Session {
            limits: OrderLimits {
                max_order_size: config
                    .session
                    .max_order_size
                    .unwrap_or(config.account.max_position_size),
                max_position_size: config.account.max_position_size,
            },
            supported_types: config.order_types.supported.clone(),
            friction: config.execution.friction(),
            validator,
            close_positions_at_end: config.session.close_positions_at_end,
            speed_multiplier: config.speed.multiplier,
            instrument,
            feed,
            resolver: OrderResolver::new(),
            momentum: MomentumTracker::new(),
            shared: Arc::new(RwLock::new(shared)),
            initial_account: account,
            stop_requested: false,
            finishing: false,
            prev_tick_time: None,
            tick_started: None,
            run_started: None,
            next_order_id: 1,
            pending_errors: Vec::new(),
        })
    }
}
