//! Grid search over candidate thresholds
//!
//! Pure functions over an immutable sample slice, so the same window always
//! yields the same threshold.

use super::CalibrationSample;
use crate::config::CalibrationConfig;
use crate::signal::raw_side;

/// Hard bound on grid size
const MAX_GRID_STEPS: usize = 10_000;

/// Search parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridParams {
    pub grid_min: f64,
    pub grid_max: f64,
    pub grid_step: f64,
    pub min_trades: usize,
    pub turnover_penalty_alpha: f64,
}

impl From<&CalibrationConfig> for GridParams {
    fn from(config: &CalibrationConfig) -> Self {
        Self {
            grid_min: config.grid_min,
            grid_max: config.grid_max,
            grid_step: config.grid_step,
            min_trades: config.min_trades,
            turnover_penalty_alpha: config.turnover_penalty_alpha,
        }
    }
}

/// Score of one candidate threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateScore {
    pub theta: f64,
    /// t-statistic of the signed forward return over non-HOLD samples
    pub t_stat: f64,
    /// Fraction of consecutive samples where the signed signal changed
    pub turnover: f64,
    /// `t_stat - alpha * turnover`
    pub score: f64,
    /// Non-HOLD samples
    pub n: usize,
}

/// Ascending positive thresholds in `[min, max]`, rounded to 10 decimals
pub fn threshold_grid(min: f64, max: f64, step: f64) -> Vec<f64> {
    if !(step > 0.0) || !min.is_finite() || !max.is_finite() || max < min {
        return Vec::new();
    }
    (0..MAX_GRID_STEPS)
        .map(|i| min + step * i as f64)
        .take_while(|theta| *theta <= max + 1e-12)
        .filter(|theta| *theta > 0.0)
        .map(|theta| (theta * 1e10).round() / 1e10)
        .collect()
}

/// Score `theta` over `samples`
///
/// Returns `None` when fewer than two samples trade or the signed returns
/// have zero variance, since the t-statistic is undefined there.
pub fn score_candidate(
    samples: &[CalibrationSample],
    theta: f64,
    turnover_penalty_alpha: f64,
) -> Option<CandidateScore> {
    let mut signed = Vec::with_capacity(samples.len());
    let mut changes = 0usize;
    let mut prev_sign: Option<i8> = None;

    for sample in samples {
        let sign = raw_side(sample.score, theta).sign();
        if let Some(prev) = prev_sign {
            if prev != sign {
                changes += 1;
            }
        }
        prev_sign = Some(sign);
        if sign != 0 {
            signed.push(f64::from(sign) * sample.forward_return);
        }
    }

    let n = signed.len();
    if n < 2 {
        return None;
    }
    let mean = signed.iter().sum::<f64>() / n as f64;
    let var = signed.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / (n - 1) as f64;
    let sd = var.sqrt();
    if !(sd > 0.0) || !sd.is_finite() {
        return None;
    }

    let t_stat = mean / (sd / (n as f64).sqrt());
    let turnover = if samples.len() > 1 {
        changes as f64 / (samples.len() - 1) as f64
    } else {
        0.0
    };
    let score = t_stat - turnover_penalty_alpha * turnover;

    score.is_finite().then_some(CandidateScore {
        theta,
        t_stat,
        turnover,
        score,
        n,
    })
}

/// Highest score among candidates with at least `min_trades` samples
///
/// Candidates must arrive in ascending theta order; only a strictly higher
/// score displaces the incumbent, so ties resolve to the smallest theta.
pub fn select_best<I>(candidates: I, min_trades: usize) -> Option<CandidateScore>
where
    I: IntoIterator<Item = CandidateScore>,
{
    candidates
        .into_iter()
        .filter(|c| c.n >= min_trades && c.score.is_finite())
        .fold(None, |best: Option<CandidateScore>, c| match best {
            Some(b) if c.score <= b.score => Some(b),
            _ => Some(c),
        })
}

/// Full search without smoothing
pub fn grid_search(samples: &[CalibrationSample], params: &GridParams) -> Option<CandidateScore> {
    let grid = threshold_grid(params.grid_min, params.grid_max, params.grid_step);
    select_best(
        grid.into_iter()
            .filter_map(|theta| score_candidate(samples, theta, params.turnover_penalty_alpha)),
        params.min_trades,
    )
}
