//! Signal types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Directional signal, including the no-trade case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
    #[default]
    Hold,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        }
    }

    /// Signed signal value: +1, -1 or 0
    pub fn sign(&self) -> i8 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
            Self::Hold => 0,
        }
    }

    /// The side as an order direction, `None` for HOLD
    pub fn trade_side(&self) -> Option<TradeSide> {
        match self {
            Self::Buy => Some(TradeSide::Buy),
            Self::Sell => Some(TradeSide::Sell),
            Self::Hold => None,
        }
    }

    pub fn is_hold(&self) -> bool {
        matches!(self, Self::Hold)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Wire representation used by the exchange
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl From<TradeSide> for Side {
    fn from(side: TradeSide) -> Self {
        match side {
            TradeSide::Buy => Side::Buy,
            TradeSide::Sell => Side::Sell,
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Imbalance reading and the side the threshold assigns it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSignal {
    pub imbalance: f64,
    pub side: Side,
}

impl RawSignal {
    pub fn new(imbalance: f64, threshold: f64) -> Self {
        Self {
            imbalance,
            side: raw_side(imbalance, threshold),
        }
    }

    /// A forced HOLD that keeps the observed imbalance for reporting
    pub fn hold(imbalance: f64) -> Self {
        Self {
            imbalance,
            side: Side::Hold,
        }
    }
}

/// BUY strictly above `threshold`, SELL strictly below `-threshold`
pub fn raw_side(imbalance: f64, threshold: f64) -> Side {
    if !imbalance.is_finite() {
        return Side::Hold;
    }
    if imbalance > threshold {
        Side::Buy
    } else if imbalance < -threshold {
        Side::Sell
    } else {
        Side::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_side_is_strict() {
        assert_eq!(raw_side(0.06, 0.06), Side::Hold);
        assert_eq!(raw_side(0.0601, 0.06), Side::Buy);
        assert_eq!(raw_side(-0.06, 0.06), Side::Hold);
        assert_eq!(raw_side(-0.07, 0.06), Side::Sell);
    }

    #[test]
    fn test_zero_threshold() {
        assert_eq!(raw_side(0.0, 0.0), Side::Hold);
        assert_eq!(raw_side(1e-9, 0.0), Side::Buy);
    }

    #[test]
    fn test_non_finite_imbalance_holds() {
        assert_eq!(raw_side(f64::NAN, 0.1), Side::Hold);
        assert_eq!(raw_side(f64::INFINITY, 0.1), Side::Hold);
    }

    #[test]
    fn test_side_conversions() {
        assert_eq!(Side::Buy.trade_side(), Some(TradeSide::Buy));
        assert_eq!(Side::Hold.trade_side(), None);
        assert_eq!(Side::from(TradeSide::Sell), Side::Sell);
        assert_eq!(Side::Sell.sign(), -1);
        assert_eq!(Side::Hold.to_string(), "HOLD");
        assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "\"BUY\"");
    }
}
