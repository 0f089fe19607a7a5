//! Walk-forward calibration engine

use super::grid::{score_candidate, select_best, threshold_grid, CandidateScore, GridParams};
use super::{
    CalibrationOutcome, CalibrationPhase, CalibrationReport, CalibrationSample, ThresholdState,
};
use crate::config::{CalibrationConfig, CalibrationMode};
use std::collections::{HashMap, VecDeque};

/// Grid key with enough precision to identify a rounded threshold
fn theta_key(theta: f64) -> i64 {
    (theta * 1e10).round() as i64
}

/// Owns the sample buffer and the active threshold
///
/// Call [`CalibrationEngine::observe`] once per valid poll, then read
/// [`CalibrationEngine::threshold`]. The threshold changes only inside
/// `observe`, never between reading it and acting on it.
#[derive(Debug)]
pub struct CalibrationEngine {
    config: CalibrationConfig,
    params: GridParams,
    grid: Vec<f64>,
    state: ThresholdState,
    /// `(imbalance, mid, poll)` awaiting their forward return
    pending: VecDeque<(f64, f64, u64)>,
    samples: VecDeque<CalibrationSample>,
    /// Smoothed score per grid point across recalibrations
    smoothed: HashMap<i64, f64>,
    polls_since_calibration: usize,
    last_report: Option<CalibrationReport>,
}

impl CalibrationEngine {
    pub fn new(config: &CalibrationConfig, static_threshold: f64) -> Self {
        let phase = match config.mode {
            CalibrationMode::Off => CalibrationPhase::Static,
            _ => CalibrationPhase::Warmup,
        };
        Self {
            params: GridParams::from(config),
            grid: threshold_grid(config.grid_min, config.grid_max, config.grid_step),
            state: ThresholdState {
                active_threshold: static_threshold.max(0.0),
                mode: config.mode,
                phase,
                last_calibration_poll: None,
            },
            pending: VecDeque::new(),
            samples: VecDeque::with_capacity(config.window_polls),
            smoothed: HashMap::new(),
            polls_since_calibration: 0,
            last_report: None,
            config: config.clone(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.state.active_threshold
    }

    pub fn state(&self) -> &ThresholdState {
        &self.state
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.state.phase
    }

    /// No threshold adopted yet, so no orders may be sent
    pub fn is_warming_up(&self) -> bool {
        self.state.phase == CalibrationPhase::Warmup
    }

    pub fn last_report(&self) -> Option<&CalibrationReport> {
        self.last_report.as_ref()
    }

    pub fn samples(&self) -> impl Iterator<Item = &CalibrationSample> {
        self.samples.iter()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Record one poll and recalibrate if due
    ///
    /// Returns the report when a calibration was attempted on this poll.
    pub fn observe(&mut self, poll: u64, imbalance: f64, mid: f64) -> Option<CalibrationReport> {
        if self.config.mode == CalibrationMode::Off {
            return None;
        }

        self.label(poll, imbalance, mid);

        match (self.config.mode, self.state.phase) {
            (_, CalibrationPhase::Warmup) => {
                if self.samples.len() < self.config.window_polls {
                    return None;
                }
                Some(self.calibrate(poll))
            }
            (CalibrationMode::RollingWalkForward, CalibrationPhase::Trading) => {
                self.polls_since_calibration += 1;
                if self.polls_since_calibration < self.config.trade_polls {
                    return None;
                }
                Some(self.calibrate(poll))
            }
            _ => None,
        }
    }

    fn label(&mut self, poll: u64, imbalance: f64, mid: f64) {
        if !(mid > 0.0) || !mid.is_finite() {
            return;
        }
        self.pending.push_back((imbalance, mid, poll));
        if self.pending.len() <= self.config.horizon_polls {
            return;
        }
        let Some((prev_imbalance, prev_mid, prev_poll)) = self.pending.pop_front() else {
            return;
        };
        let forward_return = mid / prev_mid - 1.0;
        if !prev_imbalance.is_finite() || !forward_return.is_finite() {
            return;
        }
        if self.samples.len() == self.config.window_polls {
            self.samples.pop_front();
        }
        self.samples.push_back(CalibrationSample {
            score: prev_imbalance,
            forward_return,
            poll_index: prev_poll,
        });
    }

    fn calibrate(&mut self, poll: u64) -> CalibrationReport {
        self.polls_since_calibration = 0;
        let window_len = self.samples.len();

        let report = if window_len < self.config.window_polls {
            CalibrationReport::rejected(poll, window_len, CalibrationOutcome::InsufficientSamples)
        } else if self.grid.is_empty() {
            CalibrationReport::rejected(poll, window_len, CalibrationOutcome::EmptyGrid)
        } else {
            self.search(poll, window_len)
        };

        if let Some(theta) = report.theta {
            let previous = self.state.active_threshold;
            self.state.active_threshold = theta.max(0.0);
            self.state.phase = CalibrationPhase::Trading;
            self.state.last_calibration_poll = Some(poll);
            tracing::info!(
                poll,
                previous,
                theta,
                score = report.score,
                n = report.n,
                turnover = report.turnover,
                window_len,
                "Threshold calibrated"
            );
        } else {
            tracing::info!(
                poll,
                outcome = report.outcome.as_str(),
                window_len,
                retained = self.state.active_threshold,
                "Calibration kept previous threshold"
            );
        }

        self.last_report = Some(report.clone());
        report
    }

    fn search(&mut self, poll: u64, window_len: usize) -> CalibrationReport {
        let alpha = self.params.turnover_penalty_alpha;
        let min_trades = self.params.min_trades;
        let samples: &[CalibrationSample] = self.samples.make_contiguous();
        let candidates: Vec<CandidateScore> = self
            .grid
            .iter()
            .filter_map(|theta| score_candidate(samples, *theta, alpha))
            .filter(|c| c.n >= min_trades)
            .collect();

        let lambda = self.config.ema_lambda;
        let smoothed: Vec<CandidateScore> = candidates
            .into_iter()
            .map(|mut c| {
                if lambda > 0.0 {
                    let key = theta_key(c.theta);
                    let value = match self.smoothed.get(&key) {
                        Some(prev) => lambda * c.score + (1.0 - lambda) * prev,
                        None => c.score,
                    };
                    self.smoothed.insert(key, value);
                    c.score = value;
                }
                c
            })
            .collect();

        match select_best(smoothed, min_trades) {
            Some(best) => CalibrationReport {
                poll,
                theta: Some(best.theta),
                score: Some(best.score),
                n: best.n,
                turnover: best.turnover,
                window_len,
                outcome: CalibrationOutcome::Adopted,
            },
            None => CalibrationReport::rejected(
                poll,
                window_len,
                CalibrationOutcome::NoEligibleCandidate,
            ),
        }
    }
}
