//! Risk manager

use super::{create_sizer, round_down_step, PositionSizer, RiskRejection, RiskState};
use crate::config::{RiskConfig, SizingConfig};
use crate::exchange::ExchangeFilters;
use crate::execution::OrderIntent;
use crate::signal::TradeSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Inputs for one risk evaluation
#[derive(Debug, Clone)]
pub struct RiskContext<'a> {
    pub side: TradeSide,
    /// Imbalance of the poll that produced the signal
    pub imbalance: f64,
    /// Threshold in force when the signal was produced
    pub threshold: f64,
    /// Reference price for sizing and notional checks
    pub mid: Decimal,
    pub now: DateTime<Utc>,
    pub filters: &'a ExchangeFilters,
    /// Synced quote balance. `None` skips the balance check (paper mode).
    pub quote_balance: Option<Decimal>,
}

/// Turns an executable side into an [`OrderIntent`] or a rejection
pub struct RiskManager {
    config: RiskConfig,
    sizer: Box<dyn PositionSizer>,
}

impl RiskManager {
    pub fn new(risk: &RiskConfig, sizing: &SizingConfig) -> Self {
        Self {
            sizer: create_sizer(sizing, risk.max_notional_per_trade_usdt),
            config: risk.clone(),
        }
    }

    pub fn sizing_mode(&self) -> &'static str {
        self.sizer.mode_name()
    }

    /// Seconds left on the cooldown, if it is active at `now`
    pub fn cooldown_remaining(&self, state: &RiskState, now: DateTime<Utc>) -> Option<f64> {
        let last = state.last_trade_time?;
        let elapsed = (now - last).num_milliseconds() as f64 / 1000.0;
        (elapsed < self.config.cooldown_secs).then(|| self.config.cooldown_secs - elapsed)
    }

    /// Run every check in order. Sets `last_trade_time` only on success.
    pub fn evaluate(
        &self,
        state: &mut RiskState,
        ctx: &RiskContext<'_>,
    ) -> Result<OrderIntent, RiskRejection> {
        let mid = ctx.mid;
        if mid <= Decimal::ZERO {
            return Err(RiskRejection::InvalidPrice(mid));
        }

        if let Some(remaining_secs) = self.cooldown_remaining(state, ctx.now) {
            return Err(RiskRejection::CooldownActive { remaining_secs });
        }

        let notional = self.sizer.notional(ctx.imbalance, ctx.threshold);
        if notional <= Decimal::ZERO {
            return Err(RiskRejection::ZeroNotional);
        }
        let floor = self.config.min_notional_per_trade_usdt;
        if floor > Decimal::ZERO && notional < floor {
            return Err(RiskRejection::BelowNotionalFloor { notional, floor });
        }

        let mut raw_qty = notional / mid;
        if ctx.side == TradeSide::Sell && !self.config.allow_short {
            let available = state.position_btc.max(Decimal::ZERO);
            if available <= Decimal::ZERO {
                return Err(RiskRejection::InsufficientInventory);
            }
            raw_qty = raw_qty.min(available);
        }

        let filters = ctx.filters;
        let qty = round_down_step(raw_qty, filters.step_size);
        if qty <= Decimal::ZERO {
            return Err(RiskRejection::RoundedToZero);
        }
        if qty < filters.min_qty {
            return Err(RiskRejection::BelowMinQty {
                qty,
                min_qty: filters.min_qty,
            });
        }
        if filters.max_qty > Decimal::ZERO && qty > filters.max_qty {
            return Err(RiskRejection::AboveMaxQty {
                qty,
                max_qty: filters.max_qty,
            });
        }

        let order_notional = qty * mid;
        if order_notional < filters.min_notional {
            return Err(RiskRejection::BelowMinNotional {
                notional: order_notional,
                min_notional: filters.min_notional,
            });
        }

        if let (TradeSide::Buy, Some(available)) = (ctx.side, ctx.quote_balance) {
            if order_notional > available {
                return Err(RiskRejection::InsufficientQuote {
                    notional: order_notional,
                    available,
                });
            }
        }

        let limit = self.config.max_abs_position_btc;
        let (resulting, breached) = match ctx.side {
            TradeSide::Buy => {
                let resulting = state.position_btc + qty;
                (resulting, resulting > limit)
            }
            TradeSide::Sell => {
                let resulting = state.position_btc - qty;
                (resulting, resulting < -limit)
            }
        };
        if breached {
            return Err(RiskRejection::MaxAbsPositionExceeded { resulting, limit });
        }

        state.last_trade_time = Some(ctx.now);
        Ok(OrderIntent {
            side: ctx.side,
            quantity: qty,
            notional: order_notional,
            reference_price: mid,
        })
    }
}
