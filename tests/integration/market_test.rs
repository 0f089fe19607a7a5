//! Snapshot fetching against the scripted exchange

use crate::common::FakeExchange;
use chrono::Utc;
use obi_taker::config::ExchangeConfig;
use obi_taker::market::fetch_snapshot;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_depth_mode_sums_top_levels() {
    let exchange = FakeExchange::new();
    exchange.push_quantities(dec!(3), dec!(1));
    let config = ExchangeConfig {
        use_depth: true,
        depth_levels: 3,
        ..Default::default()
    };

    let snapshot = fetch_snapshot(&exchange, &config, Utc::now()).await.unwrap();

    // Prices stay at the top of book, quantities are summed over 3 levels
    assert_eq!(snapshot.best_bid, dec!(99));
    assert_eq!(snapshot.best_ask, dec!(101));
    assert_eq!(snapshot.bid_qty, dec!(5));
    assert_eq!(snapshot.ask_qty, dec!(3));
    assert!((snapshot.imbalance - 0.25).abs() < 1e-12);
    assert_eq!(snapshot.depth_update_id, Some(42));
}

#[tokio::test]
async fn test_ticker_mode_uses_level_one() {
    let exchange = FakeExchange::new();
    exchange.push_quantities(dec!(3), dec!(1));
    let config = ExchangeConfig::default();

    let snapshot = fetch_snapshot(&exchange, &config, Utc::now()).await.unwrap();

    assert_eq!(snapshot.bid_qty, dec!(3));
    assert_eq!(snapshot.ask_qty, dec!(1));
    assert!((snapshot.imbalance - 0.5).abs() < 1e-12);
    assert_eq!(snapshot.depth_update_id, None);
}
