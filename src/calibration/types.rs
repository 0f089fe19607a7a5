//! Calibration types

use crate::config::CalibrationMode;
use serde::Serialize;
use std::fmt;

/// An imbalance reading labelled with the return that followed it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationSample {
    /// Imbalance observed at `poll_index`
    pub score: f64,
    /// `mid(t + horizon) / mid(t) - 1`
    pub forward_return: f64,
    pub poll_index: u64,
}

/// Where the calibration engine is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationPhase {
    /// Calibration disabled, static threshold
    Static,
    /// Collecting samples, no threshold adopted yet
    Warmup,
    /// Trading on a calibrated threshold
    Trading,
}

impl CalibrationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Warmup => "warmup",
            Self::Trading => "trading",
        }
    }
}

impl fmt::Display for CalibrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Threshold read by the signal pipeline every poll
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdState {
    pub active_threshold: f64,
    pub mode: CalibrationMode,
    pub phase: CalibrationPhase,
    /// Poll of the last successful calibration
    pub last_calibration_poll: Option<u64>,
}

/// Result of a calibration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationOutcome {
    Adopted,
    InsufficientSamples,
    EmptyGrid,
    /// No candidate reached the minimum trade count
    NoEligibleCandidate,
}

impl CalibrationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Adopted => "adopted",
            Self::InsufficientSamples => "insufficient_samples",
            Self::EmptyGrid => "empty_grid",
            Self::NoEligibleCandidate => "no_eligible_candidate",
        }
    }
}

/// Summary of one calibration attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationReport {
    pub poll: u64,
    /// Chosen threshold, `None` unless adopted
    pub theta: Option<f64>,
    /// Penalized (and smoothed, if enabled) score of `theta`
    pub score: Option<f64>,
    /// Non-HOLD samples `theta` produced
    pub n: usize,
    pub turnover: f64,
    pub window_len: usize,
    pub outcome: CalibrationOutcome,
}

impl CalibrationReport {
    pub(crate) fn rejected(poll: u64, window_len: usize, outcome: CalibrationOutcome) -> Self {
        Self {
            poll,
            theta: None,
            score: None,
            n: 0,
            turnover: 0.0,
            window_len,
            outcome,
        }
    }
}
