//! Prometheus metrics

use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Snapshot fetch round trip
    SnapshotFetch,
    /// Market order placement round trip
    OrderSubmission,
    /// Whole poll, fetch to recorded row
    Poll,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    Imbalance,
    ActiveThreshold,
    PositionBtc,
    PaperEquity,
    PaperPnl,
    PaperDrawdownPct,
    ConsecutiveErrors,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    Polls,
    PollErrors,
    SkippedPolls,
    RiskRejections,
    OrdersPlaced,
    OrdersFilled,
    PaperFills,
    Calibrations,
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let metric_name = match metric {
        LatencyMetric::SnapshotFetch => "obi_snapshot_fetch_latency_ms",
        LatencyMetric::OrderSubmission => "obi_order_submission_latency_ms",
        LatencyMetric::Poll => "obi_poll_latency_ms",
    };
    ::metrics::histogram!(metric_name).record(duration.as_secs_f64() * 1000.0);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let metric_name = match metric {
        GaugeMetric::Imbalance => "obi_imbalance",
        GaugeMetric::ActiveThreshold => "obi_active_threshold",
        GaugeMetric::PositionBtc => "obi_position_btc",
        GaugeMetric::PaperEquity => "obi_paper_equity_usdt",
        GaugeMetric::PaperPnl => "obi_paper_pnl_usdt",
        GaugeMetric::PaperDrawdownPct => "obi_paper_drawdown_pct",
        GaugeMetric::ConsecutiveErrors => "obi_consecutive_errors",
    };
    ::metrics::gauge!(metric_name).set(value);
}

/// Increment a counter by one
pub fn increment_counter(metric: CounterMetric) {
    let metric_name = match metric {
        CounterMetric::Polls => "obi_polls_total",
        CounterMetric::PollErrors => "obi_poll_errors_total",
        CounterMetric::SkippedPolls => "obi_skipped_polls_total",
        CounterMetric::RiskRejections => "obi_risk_rejections_total",
        CounterMetric::OrdersPlaced => "obi_orders_placed_total",
        CounterMetric::OrdersFilled => "obi_orders_filled_total",
        CounterMetric::PaperFills => "obi_paper_fills_total",
        CounterMetric::Calibrations => "obi_calibrations_total",
    };
    ::metrics::counter!(metric_name).increment(1);
}
