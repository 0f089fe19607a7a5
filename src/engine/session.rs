//! Per-run trading state

use crate::calibration::CalibrationEngine;
use crate::config::{Config, ExecutionMode};
use crate::exchange::ExchangeFilters;
use crate::execution::{PaperMark, PaperPortfolio};
use crate::market::StaleBookGuard;
use crate::risk::RiskState;
use crate::signal::SignalPipeline;
use rust_decimal::Decimal;
use serde::Serialize;

/// Imbalance and threshold of the poll whose confirmed side is pending
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalStrength {
    pub imbalance: f64,
    pub threshold: f64,
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub polls: u64,
    pub orders_placed: u64,
    pub orders_filled: u64,
    pub dry_run_orders: u64,
    pub error_count: u64,
    pub skipped_polls: u64,
    pub risk_rejections: u64,
}

/// Live account equity tracked against the first marked equity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PnlProxy {
    initial_equity: Option<Decimal>,
    pub last: Option<Decimal>,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

impl PnlProxy {
    /// Mark `base * mid + quote`; the first mark becomes the baseline
    pub fn mark(&mut self, base: Decimal, quote: Decimal, mid: Decimal) -> Decimal {
        let equity = base * mid + quote;
        let pnl = equity - *self.initial_equity.get_or_insert(equity);
        self.last = Some(pnl);
        self.min = Some(self.min.map_or(pnl, |m| m.min(pnl)));
        self.max = Some(self.max.map_or(pnl, |m| m.max(pnl)));
        pnl
    }
}

/// Everything the controller mutates between polls
#[derive(Debug)]
pub struct Session {
    pub poll: u64,
    pub risk: RiskState,
    /// Symbol filters from the last successful resync
    pub filters: Option<ExchangeFilters>,
    /// Synced quote balance, live mode only
    pub quote_balance: Option<Decimal>,
    pub pipeline: SignalPipeline,
    pub stale_guard: StaleBookGuard,
    pub calibration: CalibrationEngine,
    pub paper: PaperPortfolio,
    /// Paper mark at the last valid snapshot
    pub last_mark: Option<PaperMark>,
    /// Strength attached to the pipeline's pending side
    pub pending_strength: Option<SignalStrength>,
    /// Live mode only
    pub pnl_proxy: PnlProxy,
    pub stats: RunStats,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        let paper = PaperPortfolio::new(&config.paper, config.risk.allow_short);
        // Live positions come from the first balance sync
        let position = match config.execution.mode {
            ExecutionMode::Paper => paper.btc,
            ExecutionMode::Live => Decimal::ZERO,
        };

        Self {
            poll: 0,
            risk: RiskState::new(position),
            filters: None,
            quote_balance: None,
            pipeline: SignalPipeline::new(
                config.signal.confirmation_m,
                config.signal.confirmation_k,
            ),
            stale_guard: StaleBookGuard::new(config.signal.stale_repeat_limit),
            calibration: CalibrationEngine::new(&config.calibration, config.signal.threshold),
            paper,
            last_mark: None,
            pending_strength: None,
            pnl_proxy: PnlProxy::default(),
            stats: RunStats::default(),
        }
    }

    /// Filters are missing or `every` polls have passed since the last sync
    pub fn needs_resync(&self, every: u64) -> bool {
        self.filters.is_none() || self.risk.polls_since_resync >= every
    }
}
