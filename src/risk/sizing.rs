//! Position sizing implementations
//!
//! Sizers map signal strength to a USDT notional, never above the configured
//! per-trade maximum.

use crate::config::{SizingConfig, SizingMode};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Trait for position sizing implementations
pub trait PositionSizer: Send + Sync {
    /// Notional in USDT for a signal of the given imbalance
    fn notional(&self, imbalance: f64, threshold: f64) -> Decimal;

    /// Get the sizing mode name
    fn mode_name(&self) -> &'static str;
}

/// Scale `max_notional` by a fraction clipped to [0, 1]
fn scaled(max_notional: Decimal, fraction: f64) -> Decimal {
    if !fraction.is_finite() {
        return Decimal::ZERO;
    }
    let fraction = Decimal::from_f64(fraction.clamp(0.0, 1.0))
        .unwrap_or(Decimal::ZERO)
        .round_dp(10);
    max_notional * fraction
}

/// Always trades the maximum notional
#[derive(Debug, Clone)]
pub struct FixedSizer {
    pub max_notional: Decimal,
}

impl PositionSizer for FixedSizer {
    fn notional(&self, _imbalance: f64, _threshold: f64) -> Decimal {
        self.max_notional
    }

    fn mode_name(&self) -> &'static str {
        "fixed"
    }
}

/// `max_notional * clip(|imbalance|, 0, 1)`
#[derive(Debug, Clone)]
pub struct LinearAbsSizer {
    pub max_notional: Decimal,
}

impl PositionSizer for LinearAbsSizer {
    fn notional(&self, imbalance: f64, _threshold: f64) -> Decimal {
        scaled(self.max_notional, imbalance.abs())
    }

    fn mode_name(&self) -> &'static str {
        "linear_abs"
    }
}

/// `max_notional * clip((|imbalance| - threshold) / (1 - threshold), 0, 1)`
///
/// Zero whenever `threshold >= 1`.
#[derive(Debug, Clone)]
pub struct LinearExcessSizer {
    pub max_notional: Decimal,
}

impl PositionSizer for LinearExcessSizer {
    fn notional(&self, imbalance: f64, threshold: f64) -> Decimal {
        if threshold >= 1.0 {
            return Decimal::ZERO;
        }
        let excess = (imbalance.abs() - threshold) / (1.0 - threshold);
        scaled(self.max_notional, excess)
    }

    fn mode_name(&self) -> &'static str {
        "linear_excess"
    }
}

/// Create a position sizer based on configuration
pub fn create_sizer(config: &SizingConfig, max_notional: Decimal) -> Box<dyn PositionSizer> {
    if !config.dynamic {
        return Box::new(FixedSizer { max_notional });
    }
    match config.mode {
        SizingMode::LinearAbs => Box::new(LinearAbsSizer { max_notional }),
        SizingMode::LinearExcess => Box::new(LinearExcessSizer { max_notional }),
    }
}
