//! Scripted in-memory exchange for driving the controller

use async_trait::async_trait;
use obi_taker::config::{Config, ExecutionMode};
use obi_taker::data::{MemorySink, OutputRow};
use obi_taker::engine::{Controller, RunSummary};
use obi_taker::exchange::{
    Balances, BookTicker, DepthSnapshot, Exchange, ExchangeError, ExchangeFilters, OpenOrder,
    OrderAck, PriceLevel,
};
use obi_taker::signal::TradeSide;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// A placed order as the exchange saw it
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub side: TradeSide,
    pub quantity: Decimal,
    pub client_order_id: String,
}

#[derive(Default)]
struct State {
    books: VecDeque<Result<BookTicker, ExchangeError>>,
    last_book: Option<BookTicker>,
    order_errors: VecDeque<ExchangeError>,
    balances: Balances,
    placed: Vec<PlacedOrder>,
    open_orders: Vec<OpenOrder>,
    cancelled: Vec<u64>,
    next_order_id: u64,
    balance_calls: usize,
}

/// Serves scripted book tickers in order, then repeats the last good one
pub struct FakeExchange {
    state: Mutex<State>,
    filters: ExchangeFilters,
}

impl FakeExchange {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                balances: Balances {
                    base: Decimal::ZERO,
                    quote: dec!(10000),
                },
                next_order_id: 1000,
                ..Default::default()
            }),
            filters: ExchangeFilters {
                symbol: "BTCUSDT".to_string(),
                base_asset: "BTC".to_string(),
                quote_asset: "USDT".to_string(),
                min_qty: dec!(0.00001),
                max_qty: dec!(100),
                step_size: dec!(0.00001),
                min_notional: dec!(5),
            },
        }
    }

    /// Queue a book with the given level-1 quantities
    pub fn push_book(&self, bid: Decimal, ask: Decimal, bid_qty: Decimal, ask_qty: Decimal) {
        self.lock().books.push_back(Ok(BookTicker {
            bid_price: bid,
            bid_qty,
            ask_price: ask,
            ask_qty,
        }));
    }

    /// Queue a 99/101 book with the given quantities
    pub fn push_quantities(&self, bid_qty: Decimal, ask_qty: Decimal) {
        self.push_book(dec!(99), dec!(101), bid_qty, ask_qty);
    }

    pub fn push_error(&self, error: ExchangeError) {
        self.lock().books.push_back(Err(error));
    }

    pub fn fail_next_order(&self, error: ExchangeError) {
        self.lock().order_errors.push_back(error);
    }

    pub fn add_open_order(&self, order_id: u64) {
        self.lock().open_orders.push(OpenOrder {
            order_id,
            client_order_id: format!("resting-{order_id}"),
        });
    }

    pub fn placed(&self) -> Vec<PlacedOrder> {
        self.lock().placed.clone()
    }

    pub fn cancelled(&self) -> Vec<u64> {
        self.lock().cancelled.clone()
    }

    pub fn balances(&self) -> Balances {
        self.lock().balances
    }

    pub fn balance_calls(&self) -> usize {
        self.lock().balance_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl Exchange for FakeExchange {
    async fn book_ticker(&self, _symbol: &str) -> Result<BookTicker, ExchangeError> {
        let mut state = self.lock();
        match state.books.pop_front() {
            Some(Ok(book)) => {
                state.last_book = Some(book.clone());
                Ok(book)
            }
            Some(Err(e)) => Err(e),
            None => state
                .last_book
                .clone()
                .ok_or_else(|| ExchangeError::Transport("no book scripted".to_string())),
        }
    }

    /// Level 1 is the last served ticker, deeper levels hold one unit each
    async fn depth(&self, _symbol: &str, limit: usize) -> Result<DepthSnapshot, ExchangeError> {
        let book = self
            .lock()
            .last_book
            .clone()
            .ok_or_else(|| ExchangeError::Transport("no book scripted".to_string()))?;
        let side = |best: Decimal, qty: Decimal, step: Decimal| -> Vec<PriceLevel> {
            (0..limit)
                .map(|i| PriceLevel {
                    price: best + step * Decimal::from(i),
                    qty: if i == 0 { qty } else { Decimal::ONE },
                })
                .collect()
        };
        Ok(DepthSnapshot {
            last_update_id: 42,
            bids: side(book.bid_price, book.bid_qty, dec!(-1)),
            asks: side(book.ask_price, book.ask_qty, dec!(1)),
        })
    }

    async fn balances(&self, _base: &str, _quote: &str) -> Result<Balances, ExchangeError> {
        let mut state = self.lock();
        state.balance_calls += 1;
        Ok(state.balances)
    }

    async fn exchange_filters(&self, _symbol: &str) -> Result<ExchangeFilters, ExchangeError> {
        Ok(self.filters.clone())
    }

    async fn place_market_order(
        &self,
        _symbol: &str,
        side: TradeSide,
        quantity: Decimal,
        client_order_id: &str,
    ) -> Result<OrderAck, ExchangeError> {
        let mut state = self.lock();
        if let Some(error) = state.order_errors.pop_front() {
            return Err(error);
        }
        let book = state
            .last_book
            .clone()
            .ok_or_else(|| ExchangeError::Transport("no book".to_string()))?;
        let price = match side {
            TradeSide::Buy => book.ask_price,
            TradeSide::Sell => book.bid_price,
        };
        match side {
            TradeSide::Buy => {
                state.balances.base += quantity;
                state.balances.quote -= quantity * price;
            }
            TradeSide::Sell => {
                state.balances.base -= quantity;
                state.balances.quote += quantity * price;
            }
        }
        state.placed.push(PlacedOrder {
            side,
            quantity,
            client_order_id: client_order_id.to_string(),
        });
        state.next_order_id += 1;
        Ok(OrderAck {
            order_id: state.next_order_id,
            client_order_id: client_order_id.to_string(),
            status: "FILLED".to_string(),
            executed_qty: quantity,
            cumulative_quote_qty: quantity * price,
            avg_fill_price: price,
        })
    }

    async fn open_orders(&self, _symbol: &str) -> Result<Vec<OpenOrder>, ExchangeError> {
        Ok(self.lock().open_orders.clone())
    }

    async fn cancel_order(&self, _symbol: &str, order_id: u64) -> Result<(), ExchangeError> {
        let mut state = self.lock();
        state.open_orders.retain(|o| o.order_id != order_id);
        state.cancelled.push(order_id);
        Ok(())
    }
}

/// Fast-polling config that trades on any imbalance beyond 0.1
pub fn test_config(mode: ExecutionMode, max_polls: u64) -> Config {
    let mut config = Config::default();
    config.execution.mode = mode;
    config.signal.threshold = 0.1;
    config.risk.cooldown_secs = 0.0;
    config.risk.max_notional_per_trade_usdt = dec!(10);
    config.risk.max_abs_position_btc = dec!(1);
    config.resilience.poll_interval_secs = 1.0;
    config.resilience.max_polls = max_polls;
    config.normalize();
    config
}

/// Run a controller to completion, returning its summary and rows
pub async fn run(config: Config, exchange: Arc<FakeExchange>) -> (RunSummary, Vec<OutputRow>) {
    let sink = MemorySink::new();
    let mut controller = Controller::new(config, exchange, Box::new(sink.clone()));
    let (_tx, rx) = watch::channel(false);
    let summary = controller.run(rx).await;
    (summary, sink.rows())
}
