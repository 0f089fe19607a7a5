//! Exchange filter helpers

use rust_decimal::Decimal;

/// Round `quantity` down to a multiple of `step_size`
///
/// A non-positive step leaves the quantity unchanged. Negative quantities
/// become zero.
pub fn round_down_step(quantity: Decimal, step_size: Decimal) -> Decimal {
    let quantity = quantity.max(Decimal::ZERO);
    if step_size <= Decimal::ZERO {
        return quantity;
    }
    (quantity / step_size).floor() * step_size
}
