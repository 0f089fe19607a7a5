//! Market snapshot

use super::{depth_sums, imbalance};
use crate::config::ExchangeConfig;
use crate::exchange::{Exchange, ExchangeError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// One poll's view of the book. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSnapshot {
    pub timestamp: DateTime<Utc>,
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    /// L1 quantity, or the top-N sum in depth mode
    pub bid_qty: Decimal,
    pub ask_qty: Decimal,
    pub mid: Decimal,
    pub spread: Decimal,
    pub imbalance: f64,
    /// Depth snapshot id when depth mode is active
    pub depth_update_id: Option<u64>,
}

/// Why a top of book cannot be traded against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookProblem {
    NonPositivePrice,
    Crossed,
}

impl BookProblem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonPositivePrice => "non_positive_price",
            Self::Crossed => "crossed_book",
        }
    }
}

impl MarketSnapshot {
    pub fn new(
        timestamp: DateTime<Utc>,
        best_bid: Decimal,
        best_ask: Decimal,
        bid_qty: Decimal,
        ask_qty: Decimal,
    ) -> Self {
        let mid = if best_bid > Decimal::ZERO && best_ask > Decimal::ZERO {
            (best_bid + best_ask) / Decimal::TWO
        } else {
            Decimal::ZERO
        };
        Self {
            timestamp,
            best_bid,
            best_ask,
            bid_qty,
            ask_qty,
            mid,
            spread: best_ask - best_bid,
            imbalance: imbalance(bid_qty, ask_qty),
            depth_update_id: None,
        }
    }

    pub fn with_depth_update_id(mut self, id: u64) -> Self {
        self.depth_update_id = Some(id);
        self
    }

    /// Locked books (bid == ask) are accepted
    pub fn validate(&self) -> Result<(), BookProblem> {
        if self.best_bid <= Decimal::ZERO || self.best_ask <= Decimal::ZERO {
            return Err(BookProblem::NonPositivePrice);
        }
        if self.best_bid > self.best_ask {
            return Err(BookProblem::Crossed);
        }
        Ok(())
    }

    /// Key used by the stale-book guard
    pub fn book_key(&self) -> (Decimal, Decimal, Decimal, Decimal) {
        (self.best_bid, self.best_ask, self.bid_qty, self.ask_qty)
    }
}

/// Fetch the book ticker, and depth when enabled, into a snapshot
pub async fn fetch_snapshot<E>(
    exchange: &E,
    config: &ExchangeConfig,
    timestamp: DateTime<Utc>,
) -> Result<MarketSnapshot, ExchangeError>
where
    E: Exchange + ?Sized,
{
    let ticker = exchange.book_ticker(&config.symbol).await?;

    if !config.use_depth {
        return Ok(MarketSnapshot::new(
            timestamp,
            ticker.bid_price,
            ticker.ask_price,
            ticker.bid_qty,
            ticker.ask_qty,
        ));
    }

    let depth = exchange
        .depth(&config.symbol, config.depth_levels)
        .await?;
    let (bid_sum, ask_sum) = depth_sums(&depth.bids, &depth.asks, config.depth_levels);
    tracing::trace!(
        levels = config.depth_levels,
        %bid_sum,
        %ask_sum,
        update_id = depth.last_update_id,
        "Depth sums"
    );

    Ok(
        MarketSnapshot::new(timestamp, ticker.bid_price, ticker.ask_price, bid_sum, ask_sum)
            .with_depth_update_id(depth.last_update_id),
    )
}
