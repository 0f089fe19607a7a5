//! Paper trading portfolio
//!
//! Deterministic fills against the snapshot's own top of book. BUY fills at
//! the ask and SELL at the bid, each moved against us by the configured
//! slippage. Fees are charged in USDT on the fill notional.

use super::OrderIntent;
use crate::config::PaperConfig;
use crate::signal::TradeSide;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use thiserror::Error;

/// Why the paper portfolio refused an intent
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PaperReject {
    #[error("insufficient paper USDT: need {needed}, have {available}")]
    InsufficientUsdt { needed: Decimal, available: Decimal },
    #[error("insufficient paper BTC: need {needed}, have {available}")]
    InsufficientBtc { needed: Decimal, available: Decimal },
    #[error("no valid fill price")]
    InvalidPrice,
}

/// A simulated fill
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaperFill {
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub notional: Decimal,
    pub fee: Decimal,
    /// Equity change at mid caused by the fill itself
    pub equity_change: Decimal,
}

/// Mark-to-market of the paper portfolio
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PaperMark {
    pub equity: Decimal,
    pub pnl: Decimal,
    pub drawdown_pct: Decimal,
}

/// In-memory BTC/USDT portfolio
#[derive(Debug, Clone)]
pub struct PaperPortfolio {
    pub btc: Decimal,
    pub usdt: Decimal,
    start_btc: Decimal,
    start_usdt: Decimal,
    fee_rate: Decimal,
    slippage_bps: Decimal,
    allow_short: bool,
    /// Starting endowment valued at the first mid seen
    initial_equity: Option<Decimal>,
    peak_equity: Decimal,
    max_drawdown_pct: Decimal,
    max_drawdown_usdt: Decimal,
    trade_count: u64,
    win_count: u64,
}

impl PaperPortfolio {
    pub fn new(config: &PaperConfig, allow_short: bool) -> Self {
        Self {
            btc: config.start_btc,
            usdt: config.start_usdt,
            start_btc: config.start_btc,
            start_usdt: config.start_usdt,
            fee_rate: config.fee_rate,
            slippage_bps: config.slippage_bps,
            allow_short,
            initial_equity: None,
            peak_equity: Decimal::ZERO,
            max_drawdown_pct: Decimal::ZERO,
            max_drawdown_usdt: Decimal::ZERO,
            trade_count: 0,
            win_count: 0,
        }
    }

    /// Value the starting endowment at `mid` if not done yet
    pub fn init(&mut self, mid: Decimal) {
        if self.initial_equity.is_none() && mid > Decimal::ZERO {
            let equity = self.start_usdt + self.start_btc * mid;
            self.initial_equity = Some(equity);
            self.peak_equity = equity;
        }
    }

    pub fn equity(&self, mid: Decimal) -> Decimal {
        self.usdt + self.btc * mid
    }

    /// Fill an intent against the given top of book
    pub fn fill(
        &mut self,
        intent: &OrderIntent,
        best_bid: Decimal,
        best_ask: Decimal,
        mid: Decimal,
    ) -> Result<PaperFill, PaperReject> {
        self.init(mid);
        let slip = self.slippage_bps / dec!(10000);
        let qty = intent.quantity;
        let before = self.equity(mid);

        let (price, notional, fee) = match intent.side {
            TradeSide::Buy => {
                let price = best_ask * (Decimal::ONE + slip);
                if price <= Decimal::ZERO {
                    return Err(PaperReject::InvalidPrice);
                }
                let notional = qty * price;
                let fee = notional * self.fee_rate;
                let cost = notional + fee;
                if cost > self.usdt {
                    return Err(PaperReject::InsufficientUsdt {
                        needed: cost,
                        available: self.usdt,
                    });
                }
                self.btc += qty;
                self.usdt -= cost;
                (price, notional, fee)
            }
            TradeSide::Sell => {
                let price = best_bid * (Decimal::ONE - slip);
                if price <= Decimal::ZERO {
                    return Err(PaperReject::InvalidPrice);
                }
                if !self.allow_short && qty > self.btc {
                    return Err(PaperReject::InsufficientBtc {
                        needed: qty,
                        available: self.btc,
                    });
                }
                let notional = qty * price;
                let fee = notional * self.fee_rate;
                self.btc -= qty;
                self.usdt += notional - fee;
                (price, notional, fee)
            }
        };

        let equity_change = self.equity(mid) - before;
        self.trade_count += 1;
        if equity_change > Decimal::ZERO {
            self.win_count += 1;
        }

        tracing::debug!(
            side = %intent.side,
            %qty,
            %price,
            %notional,
            %fee,
            btc = %self.btc,
            usdt = %self.usdt,
            "Paper fill"
        );

        Ok(PaperFill {
            side: intent.side,
            quantity: qty,
            price,
            notional,
            fee,
            equity_change,
        })
    }

    /// Mark to market at `mid`, updating peak and drawdown
    pub fn mark(&mut self, mid: Decimal) -> PaperMark {
        self.init(mid);
        let equity = self.equity(mid);
        let initial = self.initial_equity.unwrap_or(equity);

        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
        let drawdown_usdt = self.peak_equity - equity;
        let drawdown_pct = if self.peak_equity > Decimal::ZERO {
            drawdown_usdt / self.peak_equity
        } else {
            Decimal::ZERO
        };
        self.max_drawdown_usdt = self.max_drawdown_usdt.max(drawdown_usdt);
        self.max_drawdown_pct = self.max_drawdown_pct.max(drawdown_pct);

        PaperMark {
            equity,
            pnl: equity - initial,
            drawdown_pct,
        }
    }

    pub fn trade_count(&self) -> u64 {
        self.trade_count
    }

    pub fn win_count(&self) -> u64 {
        self.win_count
    }

    /// Winning trades as a percentage, 0 with no trades
    pub fn win_rate_pct(&self) -> f64 {
        if self.trade_count == 0 {
            return 0.0;
        }
        (self.win_count as f64 / self.trade_count as f64) * 100.0
    }

    pub fn max_drawdown_pct(&self) -> Decimal {
        self.max_drawdown_pct
    }

    pub fn max_drawdown_usdt(&self) -> Decimal {
        self.max_drawdown_usdt
    }

    pub fn initial_equity(&self) -> Option<Decimal> {
        self.initial_equity
    }
}
