//! End-to-end integration tests

use crate::common::{test_config, FakeExchange};
use obi_taker::config::{Config, ExecutionMode};
use obi_taker::data::{CsvRecorder, OUTPUT_HEADER};
use obi_taker::engine::Controller;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::watch;

#[test]
fn test_config_example_parses() {
    let config: Config = toml::from_str(include_str!("../../config.toml.example")).unwrap();
    assert_eq!(config.exchange.symbol, "BTCUSDT");
    assert_eq!(config.execution.mode, ExecutionMode::Paper);
}

#[tokio::test(start_paused = true)]
async fn test_run_writes_csv_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("trades.csv");

    let exchange = Arc::new(FakeExchange::new());
    exchange.push_quantities(dec!(3), dec!(1));
    exchange.push_quantities(dec!(1), dec!(3));
    exchange.push_quantities(dec!(1), dec!(1));

    let recorder = CsvRecorder::open(&path).unwrap();
    let mut controller = Controller::new(
        test_config(ExecutionMode::Paper, 3),
        exchange,
        Box::new(recorder),
    );
    let (_tx, rx) = watch::channel(false);
    controller.run(rx).await;

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(headers.iter().collect::<Vec<_>>(), OUTPUT_HEADER.to_vec());

    let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 3);
    assert_eq!(&records[0][6], "BUY");
    assert_eq!(&records[0][8], "HOLD");
    assert_eq!(&records[1][8], "BUY");
    assert_eq!(&records[1][27], "DRY_RUN");
    // Paper fill columns, no live PnL proxy
    let decimal = |field: &str| field.parse::<Decimal>().unwrap();
    assert_eq!(decimal(&records[1][32]), dec!(0.1));
    assert_eq!(decimal(&records[1][34]), dec!(101));
    assert_eq!(&records[1][35], "");
    assert_eq!(&records[0][32], "");
}
