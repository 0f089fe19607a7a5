//! Execution types

use super::PaperReject;
use crate::exchange::ExchangeError;
use crate::signal::TradeSide;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// A fully risk-checked order. Only the risk manager constructs these.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderIntent {
    pub side: TradeSide,
    /// Base quantity, already rounded to the exchange step
    pub quantity: Decimal,
    /// `quantity * reference_price`
    pub notional: Decimal,
    /// Mid at decision time
    pub reference_price: Decimal,
}

/// Outcome of a submitted order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub client_order_id: String,
    /// Exchange order id, `None` for dry runs
    pub order_id: Option<u64>,
    pub status: String,
    pub executed_qty: Decimal,
    pub cumulative_quote_qty: Decimal,
    pub avg_fill_price: Decimal,
    /// The order reached the exchange
    pub placed: bool,
}

impl ExecutionReport {
    pub fn is_filled(&self) -> bool {
        self.status == "FILLED"
    }
}

/// Execution errors
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Exchange rejected or failed the request
    #[error("order placement failed: {0}")]
    Exchange(#[from] ExchangeError),
    /// No usable reply to the placement request; the order may or may not exist
    #[error("order placement outcome unknown (client order id {client_order_id}): {cause}")]
    AmbiguousPlacement {
        client_order_id: String,
        cause: String,
    },
    /// Paper portfolio could not fill the intent
    #[error("paper fill rejected: {0}")]
    Paper(#[from] PaperReject),
}

impl ExecutionError {
    /// Rate limiting reported by the exchange during placement
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Exchange(e) if e.is_rate_limited())
    }

    /// Status to record for the order
    pub fn order_status(&self) -> &'static str {
        match self {
            Self::AmbiguousPlacement { .. } => "UNKNOWN",
            Self::Exchange(_) => "REJECTED",
            Self::Paper(_) => "NOT_FILLED",
        }
    }
}
