//! Exchange domain types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Exchange transport errors
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// HTTP 429 (rate limit) or 418 (IP ban)
    #[error("rate limited by exchange (HTTP {status})")]
    RateLimited {
        status: u16,
        retry_after: Option<Duration>,
    },
    /// Any other non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// Request did not complete in time
    #[error("request timed out")]
    Timeout,
    /// Connection-level failure
    #[error("transport error: {0}")]
    Transport(String),
    /// Response body did not match the expected shape
    #[error("failed to decode response: {0}")]
    Decode(String),
    /// Signed endpoint called without API key/secret
    #[error("missing API credentials for signed endpoint")]
    MissingCredentials,
    /// Symbol absent from exchange info
    #[error("symbol {0} not found in exchange info")]
    UnknownSymbol(String),
}

impl ExchangeError {
    /// Rate-limit and ban responses trigger backoff immediately
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { status, .. } | Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Minimum wait requested by a rate-limit response
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// The request may have been executed even though no usable reply came back.
    /// Covers timeouts, broken connections, undecodable bodies and 5xx responses.
    pub fn outcome_unknown(&self) -> bool {
        if self.is_timeout() || matches!(self, Self::Transport(_) | Self::Decode(_)) {
            return true;
        }
        matches!(self, Self::Http { .. }) && self.status().is_some_and(|s| s >= 500)
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Best bid/ask with level-1 quantities
#[derive(Debug, Clone, PartialEq)]
pub struct BookTicker {
    pub bid_price: Decimal,
    pub bid_qty: Decimal,
    pub ask_price: Decimal,
    pub ask_qty: Decimal,
}

/// A single price level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceLevel {
    pub price: Decimal,
    pub qty: Decimal,
}

/// Top-N depth snapshot, best level first on each side
#[derive(Debug, Clone, PartialEq)]
pub struct DepthSnapshot {
    pub last_update_id: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Free + locked balances of the traded pair's assets
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Balances {
    pub base: Decimal,
    pub quote: Decimal,
}

/// Exchange-imposed order constraints for a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeFilters {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub min_qty: Decimal,
    /// Zero when the exchange does not publish one
    pub max_qty: Decimal,
    pub step_size: Decimal,
    pub min_notional: Decimal,
}

impl ExchangeFilters {
    /// Filters that accept any positive quantity
    pub fn permissive(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            base_asset: "BTC".to_string(),
            quote_asset: "USDT".to_string(),
            min_qty: Decimal::ZERO,
            max_qty: Decimal::ZERO,
            step_size: Decimal::ZERO,
            min_notional: Decimal::ZERO,
        }
    }
}

/// Acknowledgement of a placed market order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: u64,
    pub client_order_id: String,
    pub status: String,
    pub executed_qty: Decimal,
    pub cumulative_quote_qty: Decimal,
    /// Quantity-weighted fill price, zero when nothing filled
    pub avg_fill_price: Decimal,
}

impl OrderAck {
    pub fn is_filled(&self) -> bool {
        self.status == "FILLED"
    }
}

/// An order resting on the book
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub order_id: u64,
    pub client_order_id: String,
}
