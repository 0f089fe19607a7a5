//! Output row

use crate::calibration::CalibrationPhase;
use crate::signal::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Column order of [`OutputRow`]
pub const OUTPUT_HEADER: [&str; 36] = [
    "timestamp",
    "best_bid",
    "best_ask",
    "mid",
    "spread",
    "imbalance",
    "raw_side",
    "confirmed_side",
    "executed_side",
    "order_quantity",
    "order_notional",
    "acct_btc",
    "acct_usdt",
    "paper_btc",
    "paper_usdt",
    "paper_equity_usdt",
    "paper_pnl_usdt",
    "paper_trade_notional_usdt",
    "paper_fee_usdt",
    "active_threshold",
    "consecutive_error_count",
    "poll",
    "bid_qty",
    "ask_qty",
    "stale",
    "calibration_phase",
    "calibration_score",
    "action",
    "reject_reason",
    "order_status",
    "order_id",
    "error",
    "executed_qty",
    "cumulative_quote_qty",
    "avg_fill_price",
    "pnl_proxy_usdt",
];

/// What the controller did on a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowAction {
    /// Snapshot fetch failed
    PollError,
    /// Top of book unusable
    SkipPoll,
    Hold,
    /// Signal blocked by warm-up or risk
    Rejected,
    DryRun,
    OrderPlaced,
    OrderError,
}

/// One row per poll. Field order is the column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRow {
    pub timestamp: DateTime<Utc>,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub mid: Option<Decimal>,
    pub spread: Option<Decimal>,
    pub imbalance: Option<f64>,
    pub raw_side: Option<Side>,
    pub confirmed_side: Option<Side>,
    pub executed_side: Option<Side>,
    pub order_quantity: Option<Decimal>,
    pub order_notional: Option<Decimal>,
    pub acct_btc: Decimal,
    pub acct_usdt: Option<Decimal>,
    pub paper_btc: Decimal,
    pub paper_usdt: Decimal,
    pub paper_equity_usdt: Option<Decimal>,
    pub paper_pnl_usdt: Option<Decimal>,
    pub paper_trade_notional_usdt: Decimal,
    pub paper_fee_usdt: Decimal,
    pub active_threshold: f64,
    pub consecutive_error_count: u32,
    pub poll: u64,
    pub bid_qty: Option<Decimal>,
    pub ask_qty: Option<Decimal>,
    pub stale: bool,
    pub calibration_phase: CalibrationPhase,
    pub calibration_score: Option<f64>,
    pub action: RowAction,
    pub reject_reason: Option<String>,
    pub order_status: Option<String>,
    pub order_id: Option<String>,
    pub error: Option<String>,
    /// Filled base quantity, from the exchange or the paper fill
    pub executed_qty: Option<Decimal>,
    pub cumulative_quote_qty: Option<Decimal>,
    pub avg_fill_price: Option<Decimal>,
    /// Live account equity at mid minus the starting equity
    pub pnl_proxy_usdt: Option<Decimal>,
}

impl OutputRow {
    /// Row with every per-poll field empty
    pub fn new(
        poll: u64,
        timestamp: DateTime<Utc>,
        active_threshold: f64,
        calibration_phase: CalibrationPhase,
    ) -> Self {
        Self {
            timestamp,
            best_bid: None,
            best_ask: None,
            mid: None,
            spread: None,
            imbalance: None,
            raw_side: None,
            confirmed_side: None,
            executed_side: None,
            order_quantity: None,
            order_notional: None,
            acct_btc: Decimal::ZERO,
            acct_usdt: None,
            paper_btc: Decimal::ZERO,
            paper_usdt: Decimal::ZERO,
            paper_equity_usdt: None,
            paper_pnl_usdt: None,
            paper_trade_notional_usdt: Decimal::ZERO,
            paper_fee_usdt: Decimal::ZERO,
            active_threshold,
            consecutive_error_count: 0,
            poll,
            bid_qty: None,
            ask_qty: None,
            stale: false,
            calibration_phase,
            calibration_score: None,
            action: RowAction::Hold,
            reject_reason: None,
            order_status: None,
            order_id: None,
            error: None,
            executed_qty: None,
            cumulative_quote_qty: None,
            avg_fill_price: None,
            pnl_proxy_usdt: None,
        }
    }
}
