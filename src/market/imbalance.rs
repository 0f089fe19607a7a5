//! Order-book imbalance

use crate::exchange::PriceLevel;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// `(bid_qty - ask_qty) / (bid_qty + ask_qty)`, in [-1, 1]
///
/// Returns 0 when the denominator is not positive.
pub fn imbalance(bid_qty: Decimal, ask_qty: Decimal) -> f64 {
    let denom = bid_qty + ask_qty;
    if denom <= Decimal::ZERO {
        return 0.0;
    }
    ((bid_qty - ask_qty) / denom)
        .to_f64()
        .map(|v| v.clamp(-1.0, 1.0))
        .unwrap_or(0.0)
}

/// Summed quantity over the top `levels` levels of each side
pub fn depth_sums(bids: &[PriceLevel], asks: &[PriceLevel], levels: usize) -> (Decimal, Decimal) {
    let sum = |side: &[PriceLevel]| side.iter().take(levels).map(|l| l.qty).sum::<Decimal>();
    (sum(bids), sum(asks))
}
