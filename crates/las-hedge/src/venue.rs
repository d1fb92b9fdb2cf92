//! Hedge venue trait and built-in venues.

use las_core::{BoxFuture, IdempotencyKey, OrderSide, Quantity};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

use crate::error::{HedgeError, HedgeResult};

/// Venue acknowledgement of a market order.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueOrder {
    pub order_id: String,
    pub status: String,
    pub side: OrderSide,
    pub quantity: Quantity,
}

/// Derivatives venue collaborator.
///
/// `client_order_id` is forwarded to the venue so it can reject
/// resubmissions of an order it already accepted.
pub trait HedgeVenue: Send + Sync {
    fn market_buy(
        &self,
        quantity: Quantity,
        client_order_id: IdempotencyKey,
    ) -> BoxFuture<'_, HedgeResult<VenueOrder>>;

    fn market_sell(
        &self,
        quantity: Quantity,
        client_order_id: IdempotencyKey,
    ) -> BoxFuture<'_, HedgeResult<VenueOrder>>;
}

// ============================================================================
// PaperVenue
// ============================================================================

#[derive(Debug, Default)]
struct PaperBook {
    next_id: u64,
    net_position: Decimal,
    orders: HashMap<IdempotencyKey, VenueOrder>,
}

/// Fills every market order immediately and tracks the net position.
#[derive(Debug, Default)]
pub struct PaperVenue {
    book: Mutex<PaperBook>,
}

impl PaperVenue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Net position in reference units (buys positive).
    pub fn net_position(&self) -> Decimal {
        self.book.lock().net_position
    }

    fn fill(&self, side: OrderSide, quantity: Quantity, key: IdempotencyKey) -> VenueOrder {
        let mut book = self.book.lock();
        if let Some(existing) = book.orders.get(&key) {
            return existing.clone();
        }

        book.next_id += 1;
        let order = VenueOrder {
            order_id: format!("paper-{}", book.next_id),
            status: "Filled".to_string(),
            side,
            quantity,
        };
        match side {
            OrderSide::Buy => book.net_position += quantity.inner(),
            OrderSide::Sell => book.net_position -= quantity.inner(),
        }
        info!(
            order_id = %order.order_id,
            %side,
            %quantity,
            client_order_id = %key,
            net_position = %book.net_position,
            "Paper order filled"
        );
        book.orders.insert(key, order.clone());
        order
    }
}

impl HedgeVenue for PaperVenue {
    fn market_buy(
        &self,
        quantity: Quantity,
        client_order_id: IdempotencyKey,
    ) -> BoxFuture<'_, HedgeResult<VenueOrder>> {
        Box::pin(async move { Ok(self.fill(OrderSide::Buy, quantity, client_order_id)) })
    }

    fn market_sell(
        &self,
        quantity: Quantity,
        client_order_id: IdempotencyKey,
    ) -> BoxFuture<'_, HedgeResult<VenueOrder>> {
        Box::pin(async move { Ok(self.fill(OrderSide::Sell, quantity, client_order_id)) })
    }
}

// ============================================================================
// MockHedgeVenue
// ============================================================================

/// One recorded venue call.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueCall {
    pub side: OrderSide,
    pub quantity: Quantity,
    pub client_order_id: IdempotencyKey,
}

/// Mock venue for testing.
#[derive(Debug, Default)]
pub struct MockHedgeVenue {
    /// Recorded calls for verification.
    calls: Mutex<Vec<VenueCall>>,
    /// Whether calls fail.
    fail: AtomicBool,
    /// Artificial latency per call in milliseconds.
    delay_ms: AtomicU64,
}

impl MockHedgeVenue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<VenueCall> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, side: OrderSide) -> Vec<VenueCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.side == side)
            .cloned()
            .collect()
    }

    async fn record(
        &self,
        side: OrderSide,
        quantity: Quantity,
        client_order_id: IdempotencyKey,
    ) -> HedgeResult<VenueOrder> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let n = {
            let mut calls = self.calls.lock();
            calls.push(VenueCall {
                side,
                quantity,
                client_order_id,
            });
            calls.len()
        };
        if self.fail.load(Ordering::SeqCst) {
            return Err(HedgeError::Venue("mock venue failure".to_string()));
        }
        Ok(VenueOrder {
            order_id: format!("mock-{n}"),
            status: "Filled".to_string(),
            side,
            quantity,
        })
    }
}

impl HedgeVenue for MockHedgeVenue {
    fn market_buy(
        &self,
        quantity: Quantity,
        client_order_id: IdempotencyKey,
    ) -> BoxFuture<'_, HedgeResult<VenueOrder>> {
        Box::pin(self.record(OrderSide::Buy, quantity, client_order_id))
    }

    fn market_sell(
        &self,
        quantity: Quantity,
        client_order_id: IdempotencyKey,
    ) -> BoxFuture<'_, HedgeResult<VenueOrder>> {
        Box::pin(self.record(OrderSide::Sell, quantity, client_order_id))
    }
}
