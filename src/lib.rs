//! obi-taker: Order-book imbalance market-taking bot for Binance spot
//!
//! This library provides the core components for:
//! - REST market data, balances and orders from Binance
//! - Level-1 or depth-summed order-book imbalance
//! - Threshold, M-of-K confirmation and one-poll causal delay
//! - Walk-forward threshold calibration by t-statistic grid search
//! - Risk checks and dynamic sizing against exchange filters
//! - Paper portfolio simulation alongside dry-run or live execution
//! - A resilient polling controller with backoff and resync
//! - Per-poll CSV output, structured logs and Prometheus metrics

pub mod calibration;
pub mod cli;
pub mod config;
pub mod data;
pub mod engine;
pub mod exchange;
pub mod execution;
pub mod market;
pub mod risk;
pub mod signal;
pub mod telemetry;
