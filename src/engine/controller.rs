//! Polling controller
//!
//! One poll at a time: resync when due, fetch a snapshot, feed calibration
//! and the signal pipeline, run risk, execute, mark the paper portfolio and
//! record a row. Failed polls back off and too many in a row stop the run.
//! In live mode open orders are cancelled on every exit path.

use super::{Backoff, RunStats, Session, SessionClock, SignalStrength};
use crate::config::{Config, ExecutionMode};
use crate::data::{OutputRow, RowAction, RowSink};
use crate::exchange::{Exchange, ExchangeError};
use crate::execution::{DryRunEngine, ExecutionEngine, ExecutionError, LiveEngine, OrderIntent};
use crate::market::{fetch_snapshot, MarketSnapshot};
use crate::risk::{RiskContext, RiskManager};
use crate::signal::{RawSignal, Side, TradeSide};
use crate::telemetry::{
    increment_counter, record_latency, set_gauge, CounterMetric, GaugeMetric, LatencyMetric,
};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxPolls,
    MaxConsecutiveErrors,
    Shutdown,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxPolls => "max_polls",
            Self::MaxConsecutiveErrors => "max_consecutive_errors",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controller state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Polling,
    /// Refreshing filters and, in live mode, balances
    Resyncing,
    /// Waiting out a failure delay
    BackingOff(Duration),
    Stopped(StopReason),
}

/// End-of-run report
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub stop_reason: StopReason,
    #[serde(flatten)]
    pub stats: RunStats,
    pub open_orders_cancelled: usize,
    pub final_threshold: f64,
    pub paper_trades: u64,
    pub paper_wins: u64,
    pub paper_win_rate_pct: f64,
    pub paper_equity_usdt: Option<Decimal>,
    pub paper_pnl_usdt: Option<Decimal>,
    pub paper_max_drawdown_pct: Decimal,
    pub paper_max_drawdown_usdt: Decimal,
    /// Live account PnL proxy at the last valid snapshot
    pub pnl_proxy_usdt: Option<Decimal>,
    pub min_pnl_proxy_usdt: Option<Decimal>,
    pub max_pnl_proxy_usdt: Option<Decimal>,
}

/// A poll that counts toward the consecutive-error stop
#[derive(Debug)]
struct PollFailure {
    message: String,
    rate_limited: bool,
    status: Option<u16>,
    /// Server-requested minimum wait
    retry_after: Option<Duration>,
}

impl From<ExchangeError> for PollFailure {
    fn from(e: ExchangeError) -> Self {
        Self {
            rate_limited: e.is_rate_limited(),
            status: e.status(),
            retry_after: e.retry_after(),
            message: e.to_string(),
        }
    }
}

impl From<ExecutionError> for PollFailure {
    fn from(e: ExecutionError) -> Self {
        let (status, retry_after) = match &e {
            ExecutionError::Exchange(inner) => (inner.status(), inner.retry_after()),
            _ => (None, None),
        };
        Self {
            rate_limited: e.is_rate_limited(),
            status,
            retry_after,
            message: e.to_string(),
        }
    }
}

/// Drives the polling loop for one symbol
pub struct Controller<E: ?Sized> {
    config: Config,
    exchange: Arc<E>,
    executor: Box<dyn ExecutionEngine>,
    risk: RiskManager,
    sink: Box<dyn RowSink>,
    backoff: Backoff,
    clock: SessionClock,
    session: Session,
    state: ControllerState,
}

impl<E: Exchange + ?Sized + 'static> Controller<E> {
    /// Live mode places real orders through `exchange`; paper mode only
    /// reads market data from it.
    pub fn new(config: Config, exchange: Arc<E>, sink: Box<dyn RowSink>) -> Self {
        let executor: Box<dyn ExecutionEngine> = match config.execution.mode {
            ExecutionMode::Paper => Box::new(DryRunEngine),
            ExecutionMode::Live => Box::new(LiveEngine::new(Arc::clone(&exchange))),
        };

        Self {
            risk: RiskManager::new(&config.risk, &config.sizing),
            backoff: Backoff::from_config(&config.resilience),
            session: Session::new(&config),
            clock: SessionClock::start(),
            state: ControllerState::Polling,
            config,
            exchange,
            executor,
            sink,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Poll until a stop condition or shutdown, then cancel open orders
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> RunSummary {
        self.clock = SessionClock::start();
        self.state = ControllerState::Polling;
        let resilience = self.config.resilience.clone();

        tracing::info!(
            symbol = %self.config.exchange.symbol,
            mode = ?self.config.execution.mode,
            calibration = %self.config.calibration.mode,
            threshold = self.session.calibration.threshold(),
            sizing = self.risk.sizing_mode(),
            use_depth = self.config.exchange.use_depth,
            max_polls = resilience.max_polls,
            "Controller starting"
        );

        let reason = loop {
            if *shutdown.borrow() {
                break StopReason::Shutdown;
            }

            let wait = self.poll_once().await;

            let errors = self.session.risk.consecutive_error_count;
            if errors >= resilience.max_consecutive_errors {
                tracing::error!(
                    consecutive_errors = errors,
                    limit = resilience.max_consecutive_errors,
                    "Too many consecutive errors, stopping"
                );
                break StopReason::MaxConsecutiveErrors;
            }
            if resilience.max_polls > 0 && self.session.poll >= resilience.max_polls {
                break StopReason::MaxPolls;
            }

            self.state = if errors > 0 {
                ControllerState::BackingOff(wait)
            } else {
                ControllerState::Polling
            };
            if wait_or_shutdown(&mut shutdown, wait).await {
                tracing::info!("Shutdown requested");
                break StopReason::Shutdown;
            }
            self.state = ControllerState::Polling;
        };

        self.stop(reason).await
    }

    /// Run a single poll and return how long to wait before the next one
    pub async fn poll_once(&mut self) -> Duration {
        let started = Instant::now();
        self.session.poll += 1;
        self.session.stats.polls += 1;
        increment_counter(CounterMetric::Polls);

        let poll = self.session.poll;
        let now = self.clock.now();
        let mut row = OutputRow::new(
            poll,
            now,
            self.session.calibration.threshold(),
            self.session.calibration.phase(),
        );

        let result = self.poll_inner(&mut row, now).await;
        self.session.risk.polls_since_resync += 1;

        let wait = match result {
            Ok(()) => {
                self.session.risk.consecutive_error_count = 0;
                self.backoff.poll_interval()
            }
            Err(failure) => {
                let count = self.session.risk.consecutive_error_count.saturating_add(1);
                self.session.risk.consecutive_error_count = count;
                self.session.stats.error_count += 1;
                increment_counter(CounterMetric::PollErrors);

                let delay = self.backoff.after_failure(
                    count,
                    failure.rate_limited,
                    failure.retry_after,
                );
                tracing::warn!(
                    poll,
                    consecutive_errors = count,
                    delay_secs = delay.as_secs_f64(),
                    rate_limited = failure.rate_limited,
                    status = ?failure.status,
                    error = %failure.message,
                    "Poll failed"
                );
                if row.error.is_none() {
                    row.error = Some(failure.message);
                }
                delay
            }
        };

        row.consecutive_error_count = self.session.risk.consecutive_error_count;
        self.fill_accounts(&mut row);
        set_gauge(
            GaugeMetric::ConsecutiveErrors,
            f64::from(row.consecutive_error_count),
        );
        self.record(&row);
        self.heartbeat(&row);
        record_latency(LatencyMetric::Poll, started.elapsed());
        wait
    }

    async fn poll_inner(
        &mut self,
        row: &mut OutputRow,
        now: DateTime<Utc>,
    ) -> Result<(), PollFailure> {
        if self
            .session
            .needs_resync(self.config.resilience.resync_every_n_polls)
        {
            if let Err(e) = self.resync().await {
                row.action = RowAction::PollError;
                return Err(e.into());
            }
        }

        let fetch_started = Instant::now();
        let snapshot =
            match fetch_snapshot(&*self.exchange, &self.config.exchange, now).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    row.action = RowAction::PollError;
                    return Err(e.into());
                }
            };
        record_latency(LatencyMetric::SnapshotFetch, fetch_started.elapsed());

        row.best_bid = Some(snapshot.best_bid);
        row.best_ask = Some(snapshot.best_ask);
        row.mid = Some(snapshot.mid);
        row.spread = Some(snapshot.spread);
        row.imbalance = Some(snapshot.imbalance);
        row.bid_qty = Some(snapshot.bid_qty);
        row.ask_qty = Some(snapshot.ask_qty);

        if let Err(problem) = snapshot.validate() {
            row.action = RowAction::SkipPoll;
            row.reject_reason = Some(problem.as_str().to_string());
            self.session.stats.skipped_polls += 1;
            increment_counter(CounterMetric::SkippedPolls);
            tracing::warn!(
                poll = self.session.poll,
                bid = %snapshot.best_bid,
                ask = %snapshot.best_ask,
                reason = problem.as_str(),
                "Skipping poll on invalid top of book"
            );
            return Ok(());
        }

        self.trade(&snapshot, row).await
    }

    async fn trade(
        &mut self,
        snapshot: &MarketSnapshot,
        row: &mut OutputRow,
    ) -> Result<(), PollFailure> {
        let poll = self.session.poll;
        let mid = snapshot.mid.to_f64().unwrap_or(0.0);

        if let Some(report) = self.session.calibration.observe(poll, snapshot.imbalance, mid) {
            increment_counter(CounterMetric::Calibrations);
            row.calibration_score = report.score;
        }
        let threshold = self.session.calibration.threshold();
        row.active_threshold = threshold;
        row.calibration_phase = self.session.calibration.phase();
        set_gauge(GaugeMetric::Imbalance, snapshot.imbalance);
        set_gauge(GaugeMetric::ActiveThreshold, threshold);

        let stale = self.session.stale_guard.observe(snapshot);
        row.stale = stale;
        let raw = if stale {
            RawSignal::hold(snapshot.imbalance)
        } else {
            RawSignal::new(snapshot.imbalance, threshold)
        };

        let output = self.session.pipeline.step(raw);
        let strength = self.session.pending_strength.replace(SignalStrength {
            imbalance: snapshot.imbalance,
            threshold,
        });
        row.raw_side = Some(output.raw.side);
        row.confirmed_side = Some(output.confirmed);
        row.executed_side = Some(output.executable);

        let result = match output.executable.trade_side() {
            None => {
                row.action = RowAction::Hold;
                Ok(())
            }
            Some(side) => {
                let strength = strength.unwrap_or(SignalStrength {
                    imbalance: snapshot.imbalance,
                    threshold,
                });
                self.act(side, strength, snapshot, row).await
            }
        };

        self.mark(snapshot.mid, row);
        self.mark_account(snapshot.mid, row);
        result
    }

    async fn act(
        &mut self,
        side: TradeSide,
        strength: SignalStrength,
        snapshot: &MarketSnapshot,
        row: &mut OutputRow,
    ) -> Result<(), PollFailure> {
        let poll = self.session.poll;

        if self.session.calibration.is_warming_up() {
            row.action = RowAction::Rejected;
            row.reject_reason = Some("calibration_warmup".to_string());
            tracing::debug!(poll, %side, "Signal held during calibration warm-up");
            return Ok(());
        }

        let Some(filters) = self.session.filters.as_ref() else {
            row.action = RowAction::Rejected;
            row.reject_reason = Some("filters_unavailable".to_string());
            return Ok(());
        };
        let ctx = RiskContext {
            side,
            imbalance: strength.imbalance,
            threshold: strength.threshold,
            mid: snapshot.mid,
            now: row.timestamp,
            filters,
            quote_balance: self.session.quote_balance,
        };

        let intent = match self.risk.evaluate(&mut self.session.risk, &ctx) {
            Ok(intent) => intent,
            Err(rejection) => {
                row.action = RowAction::Rejected;
                row.reject_reason = Some(rejection.reason().to_string());
                self.session.stats.risk_rejections += 1;
                increment_counter(CounterMetric::RiskRejections);
                tracing::info!(
                    poll,
                    %side,
                    reason = rejection.reason(),
                    detail = %rejection,
                    "Signal rejected by risk"
                );
                return Ok(());
            }
        };

        row.order_quantity = Some(intent.quantity);
        row.order_notional = Some(intent.notional);

        let submit_started = Instant::now();
        let result = self
            .executor
            .submit(&self.config.exchange.symbol, &intent)
            .await;
        record_latency(LatencyMetric::OrderSubmission, submit_started.elapsed());

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                row.action = RowAction::OrderError;
                row.order_status = Some(e.order_status().to_string());
                row.error = Some(e.to_string());
                tracing::error!(
                    poll,
                    %side,
                    quantity = %intent.quantity,
                    order_status = e.order_status(),
                    error = %e,
                    "Order failed"
                );
                return Err(e.into());
            }
        };

        row.order_status = Some(report.status.clone());
        row.order_id = report.order_id.map(|id| id.to_string());
        if report.placed {
            row.action = RowAction::OrderPlaced;
            row.executed_qty = Some(report.executed_qty);
            row.cumulative_quote_qty = Some(report.cumulative_quote_qty);
            row.avg_fill_price = Some(report.avg_fill_price);
            tracing::info!(
                poll,
                %side,
                order_id = ?report.order_id,
                status = %report.status,
                executed_qty = %report.executed_qty,
                cumulative_quote_qty = %report.cumulative_quote_qty,
                avg_fill_price = %report.avg_fill_price,
                "Order executed"
            );
            self.session.stats.orders_placed += 1;
            increment_counter(CounterMetric::OrdersPlaced);
            if report.is_filled() {
                self.session.stats.orders_filled += 1;
                increment_counter(CounterMetric::OrdersFilled);
            }
        } else {
            row.action = RowAction::DryRun;
            self.session.stats.dry_run_orders += 1;
        }

        self.mirror_paper(&intent, snapshot, row);

        if report.placed {
            // Exchange balances are authoritative after a placed order
            self.sync_balances().await?;
        }
        Ok(())
    }

    fn mirror_paper(&mut self, intent: &OrderIntent, snapshot: &MarketSnapshot, row: &mut OutputRow) {
        let filled = self.session.paper.fill(
            intent,
            snapshot.best_bid,
            snapshot.best_ask,
            snapshot.mid,
        );
        match filled {
            Ok(fill) => {
                row.paper_trade_notional_usdt = fill.notional;
                row.paper_fee_usdt = fill.fee;
                increment_counter(CounterMetric::PaperFills);
                if !self.executor.is_live() {
                    self.session.risk.position_btc = self.session.paper.btc;
                    row.executed_qty = Some(fill.quantity);
                    row.cumulative_quote_qty = Some(fill.notional);
                    row.avg_fill_price = Some(fill.price);
                }
            }
            Err(reject) => {
                tracing::warn!(poll = self.session.poll, error = %reject, "Paper fill rejected");
                if !self.executor.is_live() {
                    let e = ExecutionError::from(reject);
                    row.order_status = Some(e.order_status().to_string());
                    row.error = Some(e.to_string());
                }
            }
        }
    }

    fn mark(&mut self, mid: Decimal, row: &mut OutputRow) {
        let mark = self.session.paper.mark(mid);
        self.session.last_mark = Some(mark);
        row.paper_equity_usdt = Some(mark.equity);
        row.paper_pnl_usdt = Some(mark.pnl);
        set_gauge(GaugeMetric::PaperEquity, mark.equity.to_f64().unwrap_or(0.0));
        set_gauge(GaugeMetric::PaperPnl, mark.pnl.to_f64().unwrap_or(0.0));
        set_gauge(
            GaugeMetric::PaperDrawdownPct,
            mark.drawdown_pct.to_f64().unwrap_or(0.0) * 100.0,
        );
    }

    /// Live PnL proxy against the first synced balances
    fn mark_account(&mut self, mid: Decimal, row: &mut OutputRow) {
        if !self.executor.is_live() {
            return;
        }
        let Some(quote) = self.session.quote_balance else {
            return;
        };
        let pnl = self
            .session
            .pnl_proxy
            .mark(self.session.risk.position_btc, quote, mid);
        row.pnl_proxy_usdt = Some(pnl);
    }

    async fn resync(&mut self) -> Result<(), ExchangeError> {
        self.state = ControllerState::Resyncing;
        let filters = self
            .exchange
            .exchange_filters(&self.config.exchange.symbol)
            .await?;
        tracing::info!(
            symbol = %filters.symbol,
            min_qty = %filters.min_qty,
            max_qty = %filters.max_qty,
            step_size = %filters.step_size,
            min_notional = %filters.min_notional,
            "Exchange filters synced"
        );
        self.session.filters = Some(filters);

        if self.executor.is_live() {
            self.sync_balances().await?;
        }
        self.session.risk.polls_since_resync = 0;
        self.state = ControllerState::Polling;
        Ok(())
    }

    async fn sync_balances(&mut self) -> Result<(), ExchangeError> {
        let Some(filters) = self.session.filters.as_ref() else {
            return Ok(());
        };
        let balances = self
            .exchange
            .balances(&filters.base_asset, &filters.quote_asset)
            .await?;
        self.session.risk.position_btc = balances.base;
        self.session.quote_balance = Some(balances.quote);
        tracing::debug!(base = %balances.base, quote = %balances.quote, "Balances synced");
        Ok(())
    }

    fn fill_accounts(&self, row: &mut OutputRow) {
        let paper = &self.session.paper;
        row.acct_btc = self.session.risk.position_btc;
        row.acct_usdt = if self.executor.is_live() {
            self.session.quote_balance
        } else {
            Some(paper.usdt)
        };
        row.paper_btc = paper.btc;
        row.paper_usdt = paper.usdt;
        set_gauge(
            GaugeMetric::PositionBtc,
            row.acct_btc.to_f64().unwrap_or(0.0),
        );
    }

    fn record(&mut self, row: &OutputRow) {
        if let Err(e) = self.sink.record(row) {
            tracing::error!(poll = row.poll, error = %e, "Failed to record output row");
        }
    }

    fn heartbeat(&self, row: &OutputRow) {
        if row.poll % self.config.resilience.print_every_n_polls != 0 {
            return;
        }
        tracing::info!(
            poll = row.poll,
            mid = %row.mid.unwrap_or_default(),
            imbalance = row.imbalance.unwrap_or(0.0),
            threshold = row.active_threshold,
            raw = side_label(row.raw_side),
            confirmed = side_label(row.confirmed_side),
            executed = side_label(row.executed_side),
            action = ?row.action,
            reason = row.reject_reason.as_deref().unwrap_or(""),
            position_btc = %row.acct_btc,
            paper_equity = %row.paper_equity_usdt.unwrap_or_default(),
            errors = row.consecutive_error_count,
            "Poll"
        );
    }

    async fn stop(&mut self, reason: StopReason) -> RunSummary {
        self.state = ControllerState::Stopped(reason);

        let cancelled = if self.executor.is_live() {
            match self
                .executor
                .cancel_open_orders(&self.config.exchange.symbol)
                .await
            {
                Ok(n) => {
                    tracing::info!(cancelled = n, "Open orders cancelled");
                    n
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to cancel open orders");
                    0
                }
            }
        } else {
            0
        };

        let summary = self.summary(reason, cancelled);
        tracing::info!(
            stop_reason = %summary.stop_reason,
            polls = summary.stats.polls,
            orders_placed = summary.stats.orders_placed,
            orders_filled = summary.stats.orders_filled,
            errors = summary.stats.error_count,
            cancelled = summary.open_orders_cancelled,
            paper_trades = summary.paper_trades,
            win_rate_pct = summary.paper_win_rate_pct,
            paper_equity = %summary.paper_equity_usdt.unwrap_or_default(),
            paper_pnl = %summary.paper_pnl_usdt.unwrap_or_default(),
            max_drawdown_pct = %summary.paper_max_drawdown_pct,
            pnl_proxy = ?summary.pnl_proxy_usdt,
            min_pnl_proxy = ?summary.min_pnl_proxy_usdt,
            max_pnl_proxy = ?summary.max_pnl_proxy_usdt,
            "Run finished"
        );
        summary
    }

    fn summary(&self, stop_reason: StopReason, open_orders_cancelled: usize) -> RunSummary {
        let paper = &self.session.paper;
        let mark = self.session.last_mark;
        let proxy = self.session.pnl_proxy;
        RunSummary {
            stop_reason,
            stats: self.session.stats,
            open_orders_cancelled,
            final_threshold: self.session.calibration.threshold(),
            paper_trades: paper.trade_count(),
            paper_wins: paper.win_count(),
            paper_win_rate_pct: paper.win_rate_pct(),
            paper_equity_usdt: mark.map(|m| m.equity),
            paper_pnl_usdt: mark.map(|m| m.pnl),
            paper_max_drawdown_pct: paper.max_drawdown_pct(),
            paper_max_drawdown_usdt: paper.max_drawdown_usdt(),
            pnl_proxy_usdt: proxy.last,
            min_pnl_proxy_usdt: proxy.min,
            max_pnl_proxy_usdt: proxy.max,
        }
    }
}

fn side_label(side: Option<Side>) -> &'static str {
    side.map(|s| s.as_str()).unwrap_or("-")
}

/// Sleep for `wait`, returning early with `true` if shutdown is signalled
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, wait: Duration) -> bool {
    let deadline = Instant::now() + wait;
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return false,
            changed = shutdown.changed() => match changed {
                Ok(()) if *shutdown.borrow() => return true,
                Ok(()) => continue,
                Err(_) => {
                    // Sender gone, nobody can signal any more
                    tokio::time::sleep_until(deadline).await;
                    return false;
                }
            },
        }
    }
}
