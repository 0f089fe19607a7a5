//! Exchange transport module
//!
//! REST access to the venue: quotes, depth, balances, symbol filters and
//! market orders. The trading loop only sees the [`Exchange`] trait.

mod binance;
mod types;

pub use binance::{BinanceClient, Credentials};
pub use types::{
    Balances, BookTicker, DepthSnapshot, ExchangeError, ExchangeFilters, OpenOrder, OrderAck,
    PriceLevel,
};

use crate::signal::TradeSide;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Trait for exchange implementations
///
/// Every call except [`Exchange::place_market_order`] is safe to retry.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Best bid/ask with level-1 quantities
    async fn book_ticker(&self, symbol: &str) -> Result<BookTicker, ExchangeError>;
    /// Top `limit` levels per side
    async fn depth(&self, symbol: &str, limit: usize) -> Result<DepthSnapshot, ExchangeError>;
    /// Account balances for the pair's base and quote assets
    async fn balances(&self, base_asset: &str, quote_asset: &str)
        -> Result<Balances, ExchangeError>;
    /// Lot size, step and notional filters for a symbol
    async fn exchange_filters(&self, symbol: &str) -> Result<ExchangeFilters, ExchangeError>;
    /// Place a market order for `quantity` base units. Never retried.
    async fn place_market_order(
        &self,
        symbol: &str,
        side: TradeSide,
        quantity: Decimal,
        client_order_id: &str,
    ) -> Result<OrderAck, ExchangeError>;
    /// Orders currently resting for the symbol
    async fn open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>, ExchangeError>;
    /// Cancel one order by exchange id
    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<(), ExchangeError>;
}
