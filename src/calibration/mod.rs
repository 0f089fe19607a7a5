//! Threshold calibration module
//!
//! Collects `(imbalance, forward return)` samples and periodically picks the
//! imbalance threshold that maximizes a turnover-penalized t-statistic of
//! the signed forward return. Optimizes predictive power, not realized PnL.

mod engine;
mod grid;
mod types;

pub use engine::CalibrationEngine;
pub use grid::{grid_search, score_candidate, select_best, threshold_grid, CandidateScore, GridParams};
pub use types::{
    CalibrationOutcome, CalibrationPhase, CalibrationReport, CalibrationSample, ThresholdState,
};
