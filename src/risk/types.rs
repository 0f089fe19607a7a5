//! Risk management types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

/// Why a non-HOLD executable side did not become an order
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskRejection {
    #[error("reference price {0} is not positive")]
    InvalidPrice(Decimal),
    #[error("cooldown active, {remaining_secs:.1}s remaining")]
    CooldownActive { remaining_secs: f64 },
    #[error("sized notional is zero")]
    ZeroNotional,
    #[error("notional {notional} below configured floor {floor}")]
    BelowNotionalFloor { notional: Decimal, floor: Decimal },
    #[error("no inventory to sell")]
    InsufficientInventory,
    #[error("quantity rounded to zero")]
    RoundedToZero,
    #[error("quantity {qty} below exchange minimum {min_qty}")]
    BelowMinQty { qty: Decimal, min_qty: Decimal },
    #[error("quantity {qty} above exchange maximum {max_qty}")]
    AboveMaxQty { qty: Decimal, max_qty: Decimal },
    #[error("notional {notional} below exchange minimum {min_notional}")]
    BelowMinNotional {
        notional: Decimal,
        min_notional: Decimal,
    },
    #[error("notional {notional} exceeds quote balance {available}")]
    InsufficientQuote {
        notional: Decimal,
        available: Decimal,
    },
    #[error("position would reach {resulting}, limit is {limit}")]
    MaxAbsPositionExceeded { resulting: Decimal, limit: Decimal },
}

impl RiskRejection {
    /// Stable identifier written to the output
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidPrice(_) => "bad_mid",
            Self::CooldownActive { .. } => "cooldown_active",
            Self::ZeroNotional => "zero_notional",
            Self::BelowNotionalFloor { .. } => "below_notional_floor",
            Self::InsufficientInventory => "insufficient_inventory",
            Self::RoundedToZero => "rounded_to_zero",
            Self::BelowMinQty { .. } => "below_min_qty",
            Self::AboveMaxQty { .. } => "above_max_qty",
            Self::BelowMinNotional { .. } => "below_min_notional",
            Self::InsufficientQuote { .. } => "insufficient_quote",
            Self::MaxAbsPositionExceeded { .. } => "max_abs_position_exceeded",
        }
    }
}

/// Mutable risk bookkeeping carried across polls
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiskState {
    /// Set when an order intent is built
    pub last_trade_time: Option<DateTime<Utc>>,
    pub consecutive_error_count: u32,
    pub polls_since_resync: u64,
    /// Exchange balance in live mode, paper balance otherwise
    pub position_btc: Decimal,
}

impl RiskState {
    pub fn new(position_btc: Decimal) -> Self {
        Self {
            position_btc,
            ..Default::default()
        }
    }
}
