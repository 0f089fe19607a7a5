//! Live and dry-run execution engines

use super::{ExecutionEngine, ExecutionError, ExecutionReport, OrderIntent};
use crate::exchange::Exchange;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Client order id, 36 characters to fit the exchange limit
fn new_client_order_id() -> String {
    format!("obi-{}", Uuid::new_v4().simple())
}

/// Places real market orders
pub struct LiveEngine<E: ?Sized> {
    exchange: Arc<E>,
}

impl<E: Exchange + ?Sized> LiveEngine<E> {
    pub fn new(exchange: Arc<E>) -> Self {
        Self { exchange }
    }
}

#[async_trait]
impl<E: Exchange + ?Sized + 'static> ExecutionEngine for LiveEngine<E> {
    async fn submit(
        &self,
        symbol: &str,
        intent: &OrderIntent,
    ) -> Result<ExecutionReport, ExecutionError> {
        let client_order_id = new_client_order_id();
        tracing::info!(
            %symbol,
            side = %intent.side,
            quantity = %intent.quantity,
            notional = %intent.notional,
            %client_order_id,
            "Placing market order"
        );

        let ack = match self
            .exchange
            .place_market_order(symbol, intent.side, intent.quantity, &client_order_id)
            .await
        {
            Ok(ack) => ack,
            Err(e) if e.outcome_unknown() => {
                tracing::error!(
                    %client_order_id,
                    status = ?e.status(),
                    error = %e,
                    "Order placement outcome unknown"
                );
                return Err(ExecutionError::AmbiguousPlacement {
                    client_order_id,
                    cause: e.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            order_id = ack.order_id,
            status = %ack.status,
            executed_qty = %ack.executed_qty,
            avg_fill_price = %ack.avg_fill_price,
            "Order acknowledged"
        );

        Ok(ExecutionReport {
            client_order_id: if ack.client_order_id.is_empty() {
                client_order_id
            } else {
                ack.client_order_id
            },
            order_id: Some(ack.order_id),
            status: ack.status,
            executed_qty: ack.executed_qty,
            cumulative_quote_qty: ack.cumulative_quote_qty,
            avg_fill_price: ack.avg_fill_price,
            placed: true,
        })
    }

    async fn cancel_open_orders(&self, symbol: &str) -> Result<usize, ExecutionError> {
        let open = self.exchange.open_orders(symbol).await?;
        let mut cancelled = 0;
        for order in open {
            match self.exchange.cancel_order(symbol, order.order_id).await {
                Ok(()) => cancelled += 1,
                Err(e) => tracing::warn!(
                    order_id = order.order_id,
                    error = %e,
                    "Failed to cancel open order"
                ),
            }
        }
        Ok(cancelled)
    }

    fn is_live(&self) -> bool {
        true
    }
}

/// Acknowledges intents without contacting the exchange
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunEngine;

#[async_trait]
impl ExecutionEngine for DryRunEngine {
    async fn submit(
        &self,
        _symbol: &str,
        intent: &OrderIntent,
    ) -> Result<ExecutionReport, ExecutionError> {
        tracing::debug!(side = %intent.side, quantity = %intent.quantity, "Dry-run order");
        Ok(ExecutionReport {
            client_order_id: new_client_order_id(),
            order_id: None,
            status: "DRY_RUN".to_string(),
            executed_qty: Decimal::ZERO,
            cumulative_quote_qty: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
            placed: false,
        })
    }

    async fn cancel_open_orders(&self, _symbol: &str) -> Result<usize, ExecutionError> {
        Ok(0)
    }

    fn is_live(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::TradeSide;
    use rust_decimal_macros::dec;

    fn intent() -> OrderIntent {
        OrderIntent {
            side: TradeSide::Buy,
            quantity: dec!(0.0001),
            notional: dec!(10),
            reference_price: dec!(100000),
        }
    }

    #[test]
    fn test_client_order_id_length() {
        let id = new_client_order_id();
        assert_eq!(id.len(), 36);
        assert!(id.starts_with("obi-"));
    }

    #[tokio::test]
    async fn test_dry_run_engine() {
        let engine = DryRunEngine;
        let report = engine.submit("BTCUSDT", &intent()).await.unwrap();
        assert!(!report.placed);
        assert_eq!(report.order_id, None);
        assert_eq!(report.status, "DRY_RUN");
        assert!(!engine.is_live());
        assert_eq!(engine.cancel_open_orders("BTCUSDT").await.unwrap(), 0);
    }

    #[test]
    fn test_dry_run_ids_are_unique() {
        let first = tokio_test::assert_ok!(tokio_test::block_on(
            DryRunEngine.submit("BTCUSDT", &intent())
        ));
        let second = tokio_test::assert_ok!(tokio_test::block_on(
            DryRunEngine.submit("BTCUSDT", &intent())
        ));
        assert_ne!(first.client_order_id, second.client_order_id);
    }
}
