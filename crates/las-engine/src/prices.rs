//! Price updates driving rebalance sweeps.

use las_core::Price;
use las_feed::{PriceTable, PriceTick};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::EngineResult;
use crate::rebalance::{RebalanceEngine, SweepReport, SweepTrigger};

/// Writes prices into the table and sweeps after each write.
pub struct PriceUpdater {
    prices: Arc<PriceTable>,
    engine: Arc<RebalanceEngine>,
}

impl PriceUpdater {
    pub fn new(prices: Arc<PriceTable>, engine: Arc<RebalanceEngine>) -> Self {
        Self { prices, engine }
    }

    /// Record `price` for `asset` and run exactly one sweep.
    ///
    /// Returns once that sweep has completed.
    pub async fn set(&self, asset: &str, price: Price) -> EngineResult<SweepReport> {
        self.prices.set(asset, price)?;
        self.engine.sweep(SweepTrigger::Price).await
    }

    /// Apply ticks from `rx` one at a time until `shutdown` fires or the
    /// sender goes away.
    pub async fn run(&self, mut rx: mpsc::Receiver<PriceTick>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Price updater stopping");
                    return;
                }
                tick = rx.recv() => {
                    let Some(tick) = tick else {
                        info!("Price feed closed, price updater stopping");
                        return;
                    };
                    if let Err(e) = self.set(&tick.asset, tick.price).await {
                        warn!(asset = %tick.asset, price = %tick.price, error = %e, "Price update failed");
                    }
                }
            }
        }
    }
}
