//! Controller behaviour against the scripted exchange

use crate::common::{run, test_config, FakeExchange};
use obi_taker::config::{CalibrationMode, ExecutionMode};
use obi_taker::data::{MemorySink, OutputRow, RowAction};
use obi_taker::engine::{Controller, ControllerState, RunSummary, StopReason};
use obi_taker::exchange::ExchangeError;
use obi_taker::signal::{Side, TradeSide};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_executed_side_is_previous_confirmed_side() {
    let exchange = Arc::new(FakeExchange::new());
    exchange.push_quantities(dec!(3), dec!(1)); // +0.5
    exchange.push_quantities(dec!(1), dec!(1)); // 0
    exchange.push_quantities(dec!(1), dec!(3)); // -0.5
    exchange.push_quantities(dec!(1), dec!(1));

    let config = test_config(ExecutionMode::Paper, 4);
    let (summary, rows) = run(config, Arc::clone(&exchange)).await;

    assert_eq!(summary.stop_reason, StopReason::MaxPolls);
    assert_eq!(rows.len(), 4);

    let confirmed: Vec<Side> = rows.iter().map(|r| r.confirmed_side.unwrap()).collect();
    let executed: Vec<Side> = rows.iter().map(|r| r.executed_side.unwrap()).collect();
    assert_eq!(confirmed, vec![Side::Buy, Side::Hold, Side::Sell, Side::Hold]);
    assert_eq!(executed, vec![Side::Hold, Side::Buy, Side::Hold, Side::Sell]);
    for t in 1..rows.len() {
        assert_eq!(executed[t], confirmed[t - 1]);
    }

    // Dry run: paper fills, nothing reaches the exchange
    assert_eq!(rows[1].action, RowAction::DryRun);
    assert_eq!(rows[1].order_quantity, Some(dec!(0.1)));
    assert_eq!(rows[1].paper_btc, dec!(0.1));
    assert_eq!(rows[1].paper_trade_notional_usdt, dec!(10.1));
    assert_eq!(rows[1].executed_qty, Some(dec!(0.1)));
    assert_eq!(rows[1].cumulative_quote_qty, Some(dec!(10.1)));
    assert_eq!(rows[1].avg_fill_price, Some(dec!(101)));
    assert_eq!(rows[1].pnl_proxy_usdt, None);
    assert_eq!(rows[3].action, RowAction::DryRun);
    assert_eq!(rows[3].paper_btc, Decimal::ZERO);
    assert!(exchange.placed().is_empty());

    assert_eq!(summary.paper_trades, 2);
    assert_eq!(summary.stats.dry_run_orders, 2);
    assert_eq!(summary.stats.orders_placed, 0);
    // Bought at 101, sold at 99
    assert_eq!(summary.paper_pnl_usdt, Some(dec!(-0.2)));
    assert_eq!(summary.pnl_proxy_usdt, None);
}

#[tokio::test(start_paused = true)]
async fn test_max_consecutive_errors_stops_and_cancels() {
    let exchange = Arc::new(FakeExchange::new());
    exchange.add_open_order(11);
    exchange.add_open_order(12);
    for _ in 0..3 {
        exchange.push_error(ExchangeError::Transport("connection reset".to_string()));
    }

    let mut config = test_config(ExecutionMode::Live, 0);
    config.resilience.max_consecutive_errors = 3;
    config.resilience.backoff_base_secs = 2.0;
    config.resilience.backoff_cap_secs = 60.0;

    let started = Instant::now();
    let (summary, rows) = run(config, Arc::clone(&exchange)).await;
    let elapsed = started.elapsed();

    assert_eq!(summary.stop_reason, StopReason::MaxConsecutiveErrors);
    assert_eq!(summary.stats.polls, 3);
    assert_eq!(summary.stats.error_count, 3);
    assert_eq!(summary.open_orders_cancelled, 2);
    assert_eq!(exchange.cancelled(), vec![11, 12]);

    let counts: Vec<u32> = rows.iter().map(|r| r.consecutive_error_count).collect();
    assert_eq!(counts, vec![1, 2, 3]);
    assert!(rows.iter().all(|r| r.action == RowAction::PollError));
    assert!(rows[0].error.as_deref().unwrap().contains("connection reset"));

    // First failure waits one poll interval, the second min(2 * 2^2, 60)
    assert!(elapsed >= Duration::from_secs(9));
    assert!(elapsed < Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_backs_off_immediately() {
    let exchange = Arc::new(FakeExchange::new());
    exchange.push_error(ExchangeError::RateLimited {
        status: 429,
        retry_after: None,
    });
    exchange.push_quantities(dec!(1), dec!(1));

    let config = test_config(ExecutionMode::Paper, 2);
    let started = Instant::now();
    let (summary, rows) = run(config, exchange).await;
    let elapsed = started.elapsed();

    assert_eq!(summary.stop_reason, StopReason::MaxPolls);
    assert_eq!(rows[0].action, RowAction::PollError);
    assert!(rows[0].error.as_deref().unwrap().contains("429"));
    assert_eq!(rows[1].consecutive_error_count, 0);
    assert_eq!(rows[1].action, RowAction::Hold);

    // min(2 * 2^1, 60) rather than the 1s poll interval
    assert!(elapsed >= Duration::from_secs(4));
    assert!(elapsed < Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_crossed_book_skips_poll() {
    let exchange = Arc::new(FakeExchange::new());
    exchange.push_book(dec!(101), dec!(100), dec!(5), dec!(1));
    exchange.push_quantities(dec!(1), dec!(1));

    let config = test_config(ExecutionMode::Paper, 2);
    let (summary, rows) = run(config, exchange).await;

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].action, RowAction::SkipPoll);
    assert_eq!(rows[0].reject_reason.as_deref(), Some("crossed_book"));
    assert_eq!(rows[0].consecutive_error_count, 0);
    assert!(rows[0].raw_side.is_none());
    assert_eq!(summary.stats.skipped_polls, 1);
    assert_eq!(summary.stats.error_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_live_order_resyncs_balances() {
    let exchange = Arc::new(FakeExchange::new());
    exchange.push_quantities(dec!(3), dec!(1));
    exchange.push_quantities(dec!(1), dec!(1));

    let config = test_config(ExecutionMode::Live, 2);
    let (summary, rows) = run(config, Arc::clone(&exchange)).await;

    let placed = exchange.placed();
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].side, TradeSide::Buy);
    assert_eq!(placed[0].quantity, dec!(0.1));
    assert!(placed[0].client_order_id.starts_with("obi-"));

    assert_eq!(rows[1].action, RowAction::OrderPlaced);
    assert_eq!(rows[1].order_status.as_deref(), Some("FILLED"));
    assert!(rows[1].order_id.is_some());
    assert_eq!(rows[1].executed_qty, Some(dec!(0.1)));
    assert_eq!(rows[1].cumulative_quote_qty, Some(dec!(10.1)));
    assert_eq!(rows[1].avg_fill_price, Some(dec!(101)));
    assert_eq!(rows[0].executed_qty, None);
    // Position comes from the exchange, quote balance too
    assert_eq!(rows[1].acct_btc, exchange.balances().base);
    assert_eq!(rows[1].acct_usdt, Some(dec!(9989.9)));
    // Initial sync plus the post-order sync
    assert_eq!(exchange.balance_calls(), 2);
    // Paper mirror follows the same intent
    assert_eq!(rows[1].paper_btc, dec!(0.1));

    assert_eq!(summary.stats.orders_placed, 1);
    assert_eq!(summary.stats.orders_filled, 1);
    assert_eq!(summary.open_orders_cancelled, 0);

    // 10000 USDT at mid 100, then 0.1 BTC bought at 101: 10 + 9989.9
    assert_eq!(rows[0].pnl_proxy_usdt, Some(Decimal::ZERO));
    assert_eq!(rows[1].pnl_proxy_usdt, Some(dec!(-0.1)));
    assert_eq!(summary.pnl_proxy_usdt, Some(dec!(-0.1)));
    assert_eq!(summary.min_pnl_proxy_usdt, Some(dec!(-0.1)));
    assert_eq!(summary.max_pnl_proxy_usdt, Some(Decimal::ZERO));
}

/// Fail the only live order with `error` and return its row and the summary
async fn run_failed_order(error: ExchangeError) -> (RunSummary, OutputRow) {
    let exchange = Arc::new(FakeExchange::new());
    exchange.push_quantities(dec!(3), dec!(1));
    exchange.push_quantities(dec!(1), dec!(1));
    exchange.fail_next_order(error);

    let config = test_config(ExecutionMode::Live, 2);
    let (summary, mut rows) = run(config, Arc::clone(&exchange)).await;
    assert!(exchange.placed().is_empty());
    (summary, rows.remove(1))
}

fn assert_unknown_outcome(row: &OutputRow, summary: &RunSummary) {
    assert_eq!(row.action, RowAction::OrderError);
    assert_eq!(row.order_status.as_deref(), Some("UNKNOWN"));
    assert!(row.error.as_deref().unwrap().contains("outcome unknown"));
    assert_eq!(row.consecutive_error_count, 1);
    // Neither filled nor unfilled is assumed
    assert_eq!(row.acct_btc, Decimal::ZERO);
    assert_eq!(row.paper_btc, Decimal::ZERO);
    assert_eq!(row.executed_qty, None);
    assert_eq!(summary.stats.error_count, 1);
    assert_eq!(summary.stats.orders_placed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_order_timeout_is_unknown_and_counted() {
    let (summary, row) = run_failed_order(ExchangeError::Timeout).await;
    assert_unknown_outcome(&row, &summary);
}

#[tokio::test(start_paused = true)]
async fn test_order_server_error_is_unknown() {
    let (summary, row) = run_failed_order(ExchangeError::Http {
        status: 503,
        body: "execution status unknown".to_string(),
    })
    .await;
    assert_unknown_outcome(&row, &summary);
    assert!(row.error.as_deref().unwrap().contains("503"));
}

#[tokio::test(start_paused = true)]
async fn test_order_undecodable_ack_is_unknown() {
    let (summary, row) =
        run_failed_order(ExchangeError::Decode("missing field `orderId`".to_string())).await;
    assert_unknown_outcome(&row, &summary);
}

#[tokio::test(start_paused = true)]
async fn test_order_dropped_connection_is_unknown() {
    let (summary, row) =
        run_failed_order(ExchangeError::Transport("connection reset".to_string())).await;
    assert_unknown_outcome(&row, &summary);
}

#[tokio::test(start_paused = true)]
async fn test_order_client_error_is_rejected() {
    let (summary, row) = run_failed_order(ExchangeError::Http {
        status: 400,
        body: "{\"code\":-2010,\"msg\":\"insufficient balance\"}".to_string(),
    })
    .await;
    assert_eq!(row.action, RowAction::OrderError);
    assert_eq!(row.order_status.as_deref(), Some("REJECTED"));
    assert_eq!(summary.stats.error_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_book_forces_hold() {
    let exchange = Arc::new(FakeExchange::new());
    // Served once, then repeated unchanged
    exchange.push_quantities(dec!(3), dec!(1));

    let mut config = test_config(ExecutionMode::Paper, 4);
    config.signal.stale_repeat_limit = 1;
    let (summary, rows) = run(config, exchange).await;

    let stale: Vec<bool> = rows.iter().map(|r| r.stale).collect();
    let raw: Vec<Side> = rows.iter().map(|r| r.raw_side.unwrap()).collect();
    let executed: Vec<Side> = rows.iter().map(|r| r.executed_side.unwrap()).collect();
    assert_eq!(stale, vec![false, false, true, true]);
    assert_eq!(raw, vec![Side::Buy, Side::Buy, Side::Hold, Side::Hold]);
    assert_eq!(executed, vec![Side::Hold, Side::Buy, Side::Buy, Side::Hold]);
    // The imbalance is still recorded on stale polls
    assert_eq!(rows[2].imbalance, Some(0.5));
    assert_eq!(rows[3].action, RowAction::Hold);
    assert_eq!(summary.stats.dry_run_orders, 2);
}

#[tokio::test(start_paused = true)]
async fn test_depth_mode_drives_the_signal() {
    let exchange = Arc::new(FakeExchange::new());
    // L1 says +0.5 but three levels sum to 5 vs 3, +0.25
    exchange.push_quantities(dec!(3), dec!(1));

    let mut config = test_config(ExecutionMode::Paper, 1);
    config.exchange.use_depth = true;
    config.exchange.depth_levels = 3;
    config.signal.threshold = 0.3;
    let (_, rows) = run(config, exchange).await;

    assert_eq!(rows[0].bid_qty, Some(dec!(5)));
    assert_eq!(rows[0].ask_qty, Some(dec!(3)));
    assert_eq!(rows[0].imbalance, Some(0.25));
    assert_eq!(rows[0].raw_side, Some(Side::Hold));
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_sets_minimum_wait() {
    let exchange = Arc::new(FakeExchange::new());
    exchange.push_error(ExchangeError::RateLimited {
        status: 418,
        retry_after: Some(Duration::from_secs(30)),
    });
    exchange.push_quantities(dec!(1), dec!(1));

    let config = test_config(ExecutionMode::Paper, 2);
    let started = Instant::now();
    let (_, rows) = run(config, exchange).await;
    let elapsed = started.elapsed();

    assert_eq!(rows[0].action, RowAction::PollError);
    assert!(rows[0].error.as_deref().unwrap().contains("418"));
    // Server asked for 30s, longer than min(2 * 2^1, 60)
    assert!(elapsed >= Duration::from_secs(30));
    assert!(elapsed < Duration::from_secs(31));
}

#[tokio::test(start_paused = true)]
async fn test_warmup_blocks_orders() {
    let exchange = Arc::new(FakeExchange::new());
    exchange.push_quantities(dec!(3), dec!(1));

    let mut config = test_config(ExecutionMode::Paper, 3);
    config.calibration.mode = CalibrationMode::WarmupThenTrade;
    config.calibration.window_polls = 50;
    let (summary, rows) = run(config, exchange).await;

    assert_eq!(rows[1].executed_side, Some(Side::Buy));
    assert_eq!(rows[1].action, RowAction::Rejected);
    assert_eq!(rows[1].reject_reason.as_deref(), Some("calibration_warmup"));
    assert_eq!(summary.paper_trades, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_rejects_back_to_back_signals() {
    let exchange = Arc::new(FakeExchange::new());
    exchange.push_quantities(dec!(3), dec!(1));

    let mut config = test_config(ExecutionMode::Paper, 3);
    config.risk.cooldown_secs = 15.0;
    let (summary, rows) = run(config, exchange).await;

    assert_eq!(rows[1].action, RowAction::DryRun);
    assert_eq!(rows[2].action, RowAction::Rejected);
    assert_eq!(rows[2].reject_reason.as_deref(), Some("cooldown_active"));
    assert_eq!(summary.stats.risk_rejections, 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_still_cancels_open_orders() {
    let exchange = Arc::new(FakeExchange::new());
    exchange.add_open_order(7);

    let config = test_config(ExecutionMode::Live, 0);
    let sink = MemorySink::new();
    let mut controller = Controller::new(config, Arc::clone(&exchange), Box::new(sink.clone()));
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let summary = controller.run(rx).await;
    assert_eq!(summary.stop_reason, StopReason::Shutdown);
    assert_eq!(summary.stats.polls, 0);
    assert_eq!(exchange.cancelled(), vec![7]);
    assert_eq!(
        controller.state(),
        ControllerState::Stopped(StopReason::Shutdown)
    );
    assert!(sink.rows().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_poll_once_steps_the_session() {
    let exchange = Arc::new(FakeExchange::new());
    exchange.push_quantities(dec!(1), dec!(1));

    let config = test_config(ExecutionMode::Paper, 0);
    let mut controller = Controller::new(config, exchange, Box::new(MemorySink::new()));
    let wait = controller.poll_once().await;

    assert_eq!(wait, Duration::from_secs(1));
    assert_eq!(controller.session().poll, 1);
    assert!(controller.session().filters.is_some());
    assert_eq!(controller.state(), ControllerState::Polling);
}
