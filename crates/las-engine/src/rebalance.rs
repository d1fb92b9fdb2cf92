//! Rebalance engine.
//!
//! Keeps every open contract's collateral equal to its notional valued at
//! the current price. Stale contracts are liquidated instead.
//!
//! Sweeps are serialized: a price-triggered sweep and the periodic backstop
//! never run at the same time. Each contract is processed under its
//! contract lock, so settlements and requests cannot interleave with a
//! read-modify-write.

use chrono::Utc;
use dashmap::DashMap;
use las_core::{
    expected_sats, Contract, ContractId, IdempotencyKey, NotOpenReason, Readiness,
    RebalanceDirection, Sats,
};
use las_feed::PriceTable;
use las_hedge::HedgeController;
use las_store::{ContractLocks, ContractRegistry};
use las_telemetry::Metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::EngineResult;
use crate::exchange::{ExchangeReceipt, RebalanceExchange};

/// What triggered a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepTrigger {
    Price,
    Timer,
    Manual,
}

impl SweepTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Timer => "timer",
            Self::Manual => "manual",
        }
    }
}

/// Result of processing one contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebalanceOutcome {
    /// Deposits outstanding. Expected, not an error.
    NotOpen(NotOpenReason),
    /// No usable price for the contract's asset.
    NoPrice,
    /// Collateral already matches.
    Balanced,
    Exchanged {
        direction: RebalanceDirection,
        delta: Sats,
    },
    /// Hedge closed and record deleted.
    Liquidated,
    /// Record deleted before it could be processed.
    Missing,
}

/// Per-sweep tallies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub not_open: usize,
    pub no_price: usize,
    pub balanced: usize,
    pub exchanged: usize,
    pub liquidated: usize,
    pub failed: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: &EngineResult<RebalanceOutcome>) {
        self.examined += 1;
        match outcome {
            Ok(RebalanceOutcome::NotOpen(_)) => self.not_open += 1,
            Ok(RebalanceOutcome::NoPrice) => self.no_price += 1,
            Ok(RebalanceOutcome::Balanced) => self.balanced += 1,
            Ok(RebalanceOutcome::Exchanged { .. }) => self.exchanged += 1,
            Ok(RebalanceOutcome::Liquidated) => self.liquidated += 1,
            Ok(RebalanceOutcome::Missing) => {}
            Err(_) => self.failed += 1,
        }
    }

    /// Contracts still open after the sweep.
    pub fn open(&self) -> usize {
        self.no_price + self.balanced + self.exchanged + self.failed
    }
}

/// Collateral correction for a contract at a price.
fn plan(held: Sats, expected: Sats) -> Option<(RebalanceDirection, Sats)> {
    if held > expected {
        Some((RebalanceDirection::Send, held - expected))
    } else if held < expected {
        Some((RebalanceDirection::Receive, expected - held))
    } else {
        None
    }
}

pub struct RebalanceEngine {
    registry: ContractRegistry,
    prices: Arc<PriceTable>,
    hedge: Arc<HedgeController>,
    exchange: RebalanceExchange,
    locks: ContractLocks,
    staleness_timeout: chrono::Duration,
    /// Exchanges whose write-back has not been persisted yet.
    journal: DashMap<IdempotencyKey, ExchangeReceipt>,
    sweep_gate: Mutex<()>,
}

impl RebalanceEngine {
    pub fn new(
        registry: ContractRegistry,
        prices: Arc<PriceTable>,
        hedge: Arc<HedgeController>,
        exchange: RebalanceExchange,
        locks: ContractLocks,
        staleness_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            prices,
            hedge,
            exchange,
            locks,
            staleness_timeout: chrono::Duration::milliseconds(staleness_timeout.as_millis() as i64),
            journal: DashMap::new(),
            sweep_gate: Mutex::new(()),
        }
    }

    /// Process every contract once.
    ///
    /// Per-contract failures are logged and counted; only failing to
    /// enumerate the registry is an error.
    pub async fn sweep(&self, trigger: SweepTrigger) -> EngineResult<SweepReport> {
        let _gate = self.sweep_gate.lock().await;
        let started = Instant::now();
        let mut report = SweepReport::default();

        for contract in self.registry.enumerate()? {
            let outcome = self.rebalance_contract(&contract.id).await;
            if let Err(e) = &outcome {
                warn!(contract_id = %contract.id, error = %e, "Rebalance failed, will retry next sweep");
            }
            report.record(&outcome);
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        Metrics::sweep_completed(trigger.as_str(), elapsed_ms);
        Metrics::contracts(report.open() as i64, report.not_open as i64);
        debug!(
            trigger = trigger.as_str(),
            examined = report.examined,
            exchanged = report.exchanged,
            liquidated = report.liquidated,
            failed = report.failed,
            elapsed_ms,
            "Sweep completed"
        );
        Ok(report)
    }

    /// Bring one contract's collateral in line with the current price.
    pub async fn rebalance_contract(&self, id: &ContractId) -> EngineResult<RebalanceOutcome> {
        let _guard = self.locks.lock(id).await;
        let Some(contract) = self.registry.find(id)? else {
            self.locks.remove(id);
            return Ok(RebalanceOutcome::Missing);
        };

        if let Readiness::NotOpen(reason) = contract.readiness() {
            trace!(contract_id = %id, %reason, "Contract not open, skipping");
            return Ok(RebalanceOutcome::NotOpen(reason));
        }

        let now = Utc::now();
        if contract.is_stale(now, self.staleness_timeout) {
            return self.liquidate(&contract).await;
        }

        let key = IdempotencyKey::exchange(&contract.id, contract.update_count);
        if let Some(receipt) = self.journal.get(&key).map(|r| r.clone()) {
            info!(contract_id = %id, %key, "Applying exchange that was not written back");
            return self.write_back(contract, key, receipt);
        }

        let price = match self.prices.price(&contract.asset) {
            Some(price) if price.is_positive() => price,
            _ => {
                debug!(contract_id = %id, asset = %contract.asset, "No price yet");
                return Ok(RebalanceOutcome::NoPrice);
            }
        };
        let Some(expected) = expected_sats(contract.notional_amount, price) else {
            return Ok(RebalanceOutcome::NoPrice);
        };
        let Some((direction, delta)) = plan(contract.held_sats, expected) else {
            trace!(contract_id = %id, held_sats = contract.held_sats.value(), "Collateral balanced");
            return Ok(RebalanceOutcome::Balanced);
        };

        debug!(
            contract_id = %id,
            %price,
            held_sats = contract.held_sats.value(),
            expected_sats = expected.value(),
            %direction,
            delta_sats = delta.value(),
            "Rebalancing contract"
        );
        let receipt = match self.exchange.execute(&contract, direction, delta).await {
            Ok(receipt) => receipt,
            Err(e) => {
                Metrics::rebalance(direction.as_str(), false);
                return Err(e);
            }
        };
        self.journal.insert(key.clone(), receipt.clone());
        Metrics::rebalance(direction.as_str(), true);
        self.write_back(contract, key, receipt)
    }

    fn write_back(
        &self,
        mut contract: Contract,
        key: IdempotencyKey,
        receipt: ExchangeReceipt,
    ) -> EngineResult<RebalanceOutcome> {
        contract.held_sats = receipt.apply(contract.held_sats);
        contract.update_count += 1;
        contract.last_rebalanced_at = Utc::now();
        self.registry.put(&contract)?;
        self.journal.remove(&key);

        info!(
            contract_id = %contract.id,
            held_sats = contract.held_sats.value(),
            update_count = contract.update_count,
            "Contract rebalanced"
        );
        Ok(RebalanceOutcome::Exchanged {
            direction: receipt.direction,
            delta: receipt.delta,
        })
    }

    async fn liquidate(&self, contract: &Contract) -> EngineResult<RebalanceOutcome> {
        warn!(
            contract_id = %contract.id,
            last_rebalanced_at = %contract.last_rebalanced_at,
            "Contract stale, liquidating"
        );
        if let Err(e) = self.hedge.close_position(contract).await {
            Metrics::liquidation(false);
            return Err(e.into());
        }
        if let Err(e) = self.registry.delete(&contract.id) {
            Metrics::liquidation(false);
            return Err(e.into());
        }
        self.forget(&contract.id);
        Metrics::liquidation(true);
        info!(contract_id = %contract.id, "Contract liquidated");
        Ok(RebalanceOutcome::Liquidated)
    }

    /// Drop in-memory state of a deleted contract.
    pub fn forget(&self, id: &ContractId) {
        self.journal.retain(|key, _| !key.belongs_to(id));
        self.hedge.forget(id);
        self.locks.remove(id);
    }

    /// Exchanges awaiting write-back.
    pub fn pending_write_backs(&self) -> usize {
        self.journal.len()
    }

    /// Sweep every `interval` until `shutdown` fires.
    pub async fn run_periodic(&self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        info!(interval_ms = interval.as_millis() as u64, "Periodic sweep started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Periodic sweep stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep(SweepTrigger::Timer).await {
                        error!(error = %e, "Periodic sweep failed");
                    }
                }
            }
        }
    }
}
