//! Hedge controller.
//!
//! Translates a contract's notional exposure into a venue market order.
//! Opening buys the notional in the reference asset, closing sells the same
//! size. Completed orders are remembered per idempotency key, so repeating
//! an open or close that already went through returns the recorded order
//! instead of trading again.

use dashmap::DashMap;
use las_core::{Contract, ContractId, IdempotencyKey, OrderSide, Quantity};
use las_feed::PriceTable;
use las_telemetry::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{HedgeError, HedgeResult};
use crate::venue::{HedgeVenue, VenueOrder};

pub struct HedgeController {
    venue: Arc<dyn HedgeVenue>,
    prices: Arc<PriceTable>,
    call_timeout: Duration,
    completed: DashMap<IdempotencyKey, VenueOrder>,
}

impl HedgeController {
    pub fn new(venue: Arc<dyn HedgeVenue>, prices: Arc<PriceTable>, call_timeout: Duration) -> Self {
        Self {
            venue,
            prices,
            call_timeout,
            completed: DashMap::new(),
        }
    }

    /// Hedge size: the contract's notional converted to the reference asset.
    pub fn hedge_size(&self, contract: &Contract) -> HedgeResult<Quantity> {
        Ok(self
            .prices
            .to_reference(&contract.asset, contract.notional_amount)?)
    }

    /// Market buy sized to the contract's notional.
    pub async fn open_position(&self, contract: &Contract) -> HedgeResult<VenueOrder> {
        self.execute(contract, OrderSide::Buy, IdempotencyKey::open_hedge(&contract.id))
            .await
    }

    /// Market sell sized to the contract's notional.
    pub async fn close_position(&self, contract: &Contract) -> HedgeResult<VenueOrder> {
        self.execute(contract, OrderSide::Sell, IdempotencyKey::close_hedge(&contract.id))
            .await
    }

    /// Drop remembered orders of a deleted contract.
    pub fn forget(&self, contract_id: &ContractId) {
        self.completed.retain(|key, _| !key.belongs_to(contract_id));
    }

    /// Number of remembered orders.
    pub fn remembered(&self) -> usize {
        self.completed.len()
    }

    async fn execute(
        &self,
        contract: &Contract,
        side: OrderSide,
        key: IdempotencyKey,
    ) -> HedgeResult<VenueOrder> {
        if let Some(order) = self.completed.get(&key) {
            info!(
                contract_id = %contract.id,
                order_id = %order.order_id,
                %side,
                "Hedge order already placed, not resubmitting"
            );
            Metrics::hedge_order(side.to_string().as_str(), "replayed");
            return Ok(order.clone());
        }

        let quantity = self.hedge_size(contract)?;
        let call = match side {
            OrderSide::Buy => self.venue.market_buy(quantity, key.clone()),
            OrderSide::Sell => self.venue.market_sell(quantity, key.clone()),
        };

        let result = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(HedgeError::Timeout {
                operation: format!("market {side}"),
                after_ms: self.call_timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(order) => {
                info!(
                    contract_id = %contract.id,
                    asset = %contract.asset,
                    %quantity,
                    %side,
                    order_id = %order.order_id,
                    status = %order.status,
                    "Hedge order placed"
                );
                Metrics::hedge_order(side.to_string().as_str(), "ok");
                self.completed.insert(key, order.clone());
                Ok(order)
            }
            Err(e) => {
                warn!(contract_id = %contract.id, %side, %quantity, error = %e, "Hedge order failed");
                Metrics::hedge_order(side.to_string().as_str(), "error");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::MockHedgeVenue;
    use chrono::Utc;
    use las_core::{ContractType, Price, Sats};
    use rust_decimal_macros::dec;

    fn sample_prices() -> Arc<PriceTable> {
        let table = PriceTable::new(
            "USD",
            [
                ("USD".to_string(), dec!(1)),
                ("NOK".to_string(), dec!(10)),
            ],
        )
        .unwrap();
        table.set("USD", Price::new(dec!(1))).unwrap();
        Arc::new(table)
    }

    fn sample_contract(asset: &str, notional: rust_decimal::Decimal) -> Contract {
        Contract::new(
            ContractId::new(),
            asset,
            Quantity::new(notional),
            Sats(1),
            ContractType::Unfunded,
            "peer:10456",
            Utc::now(),
        )
    }

    fn controller(venue: Arc<MockHedgeVenue>) -> HedgeController {
        HedgeController::new(venue, sample_prices(), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_open_buys_reference_notional() {
        let venue = Arc::new(MockHedgeVenue::new());
        let hedge = controller(venue.clone());

        let order = hedge
            .open_position(&sample_contract("NOK", dec!(1000)))
            .await
            .unwrap();

        assert_eq!(order.side, OrderSide::Buy);
        let calls = venue.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].quantity, Quantity::new(dec!(100)));
    }

    #[tokio::test]
    async fn test_repeated_open_does_not_duplicate() {
        let venue = Arc::new(MockHedgeVenue::new());
        let hedge = controller(venue.clone());
        let contract = sample_contract("USD", dec!(100));

        let first = hedge.open_position(&contract).await.unwrap();
        let second = hedge.open_position(&contract).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(venue.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_order_can_be_retried() {
        let venue = Arc::new(MockHedgeVenue::new());
        let hedge = controller(venue.clone());
        let contract = sample_contract("USD", dec!(100));

        venue.set_fail(true);
        assert!(hedge.close_position(&contract).await.is_err());

        venue.set_fail(false);
        assert!(hedge.close_position(&contract).await.is_ok());
        assert_eq!(venue.calls_for(OrderSide::Sell).len(), 2);
    }

    #[tokio::test]
    async fn test_slow_venue_times_out() {
        let venue = Arc::new(MockHedgeVenue::new());
        venue.set_delay(Duration::from_millis(500));
        let hedge = controller(venue);

        let err = hedge
            .open_position(&sample_contract("USD", dec!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, HedgeError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_forget_drops_contract_keys() {
        let venue = Arc::new(MockHedgeVenue::new());
        let hedge = controller(venue);
        let a = sample_contract("USD", dec!(1));
        let b = sample_contract("USD", dec!(2));

        hedge.open_position(&a).await.unwrap();
        hedge.open_position(&b).await.unwrap();
        hedge.close_position(&a).await.unwrap();
        assert_eq!(hedge.remembered(), 3);

        hedge.forget(&a.id);
        assert_eq!(hedge.remembered(), 1);
    }

    #[tokio::test]
    async fn test_unknown_asset_fails_sizing() {
        let venue = Arc::new(MockHedgeVenue::new());
        let hedge = controller(venue.clone());

        let err = hedge
            .open_position(&sample_contract("EUR", dec!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, HedgeError::Sizing(_)));
        assert!(venue.calls().is_empty());
    }
}
