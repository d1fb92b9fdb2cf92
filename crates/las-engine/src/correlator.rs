//! Settlement correlator.
//!
//! Matches settled invoices to contracts through the invoice memo (the
//! contract id) and advances the contract's deposit flags. The hedge is
//! opened on the settlement that makes a contract open. Any other settled
//! invoice of a contract confirms a collateral exchange.

use chrono::Utc;
use futures_util::StreamExt;
use las_channel::{ChannelError, ChannelLedger, SettlementEvent};
use las_core::{ContractId, ReconnectPolicy};
use las_hedge::HedgeController;
use las_store::{ContractLocks, ContractRegistry};
use las_telemetry::Metrics;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::{EngineError, EngineResult};

/// What a settlement event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Not settled, or not a contract invoice.
    Ignored,
    /// Memo names no known contract.
    UnknownContract,
    MarginPaid { opened: bool },
    InitiatingPaid { opened: bool },
    /// Exchange invoice settled; staleness clock reset.
    RebalanceConfirmed,
    /// Deposit already recorded.
    AlreadyApplied,
}

impl SettlementOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::UnknownContract => "unknown_contract",
            Self::MarginPaid { .. } => "margin",
            Self::InitiatingPaid { .. } => "initiating",
            Self::RebalanceConfirmed => "rebalance",
            Self::AlreadyApplied => "replayed",
        }
    }
}

#[derive(Clone, Copy)]
enum Deposit {
    Margin,
    Initiating,
}

pub struct SettlementCorrelator {
    registry: ContractRegistry,
    hedge: Arc<HedgeController>,
    locks: ContractLocks,
    ledger: Arc<dyn ChannelLedger>,
    reconnect: ReconnectPolicy,
}

impl SettlementCorrelator {
    pub fn new(
        registry: ContractRegistry,
        hedge: Arc<HedgeController>,
        locks: ContractLocks,
        ledger: Arc<dyn ChannelLedger>,
        reconnect: ReconnectPolicy,
    ) -> Self {
        Self {
            registry,
            hedge,
            locks,
            ledger,
            reconnect,
        }
    }

    /// Apply one settlement event.
    pub async fn handle_event(&self, event: &SettlementEvent) -> EngineResult<SettlementOutcome> {
        if !event.is_settled() {
            trace!(pay_request = %event.pay_request, state = ?event.state, "Invoice update ignored");
            return Ok(SettlementOutcome::Ignored);
        }
        if event.memo.trim().is_empty() {
            trace!(pay_request = %event.pay_request, "Settled invoice without memo, not ours");
            return Ok(SettlementOutcome::Ignored);
        }

        let id = ContractId::from_string(event.memo.trim().to_string());
        // Foreign invoices must not leave lock entries behind.
        if self.registry.find(&id)?.is_none() {
            warn!(contract_id = %id, pay_request = %event.pay_request, "Settlement for unknown contract");
            return Ok(SettlementOutcome::UnknownContract);
        }
        let _guard = self.locks.lock(&id).await;
        let Some(mut contract) = self.registry.find(&id)? else {
            self.locks.remove(&id);
            warn!(contract_id = %id, pay_request = %event.pay_request, "Contract deleted before settlement applied");
            return Ok(SettlementOutcome::UnknownContract);
        };

        let deposit = if contract.is_margin_request(&event.pay_request) {
            Deposit::Margin
        } else if contract.is_initiating_request(&event.pay_request) {
            Deposit::Initiating
        } else {
            contract.last_rebalanced_at = Utc::now();
            self.registry.put(&contract)?;
            debug!(contract_id = %id, amount_sats = event.amount_paid.value(), "Exchange invoice settled");
            return Ok(SettlementOutcome::RebalanceConfirmed);
        };

        let was_open = contract.is_open();
        match deposit {
            Deposit::Margin if contract.margin_paid => return Ok(SettlementOutcome::AlreadyApplied),
            Deposit::Initiating if contract.initiating_paid => {
                return Ok(SettlementOutcome::AlreadyApplied)
            }
            Deposit::Margin => {
                contract.margin_paid = true;
                info!(contract_id = %id, amount_sats = event.amount_paid.value(), "Margin paid");
            }
            Deposit::Initiating => {
                contract.initiating_paid = true;
                info!(contract_id = %id, amount_sats = event.amount_paid.value(), "Initiating deposit paid");
            }
        }

        let opened = !was_open && contract.is_open();
        if opened {
            contract.last_rebalanced_at = Utc::now();
            match self.hedge.open_position(&contract).await {
                Ok(order) => {
                    info!(contract_id = %id, order_id = %order.order_id, "Contract open, hedge placed");
                    contract.hedge_order_id = Some(order.order_id);
                }
                Err(e) => {
                    error!(contract_id = %id, error = %e, "Contract open but hedge order failed");
                }
            }
        }
        self.registry.put(&contract)?;

        Ok(match deposit {
            Deposit::Margin => SettlementOutcome::MarginPaid { opened },
            Deposit::Initiating => SettlementOutcome::InitiatingPaid { opened },
        })
    }

    /// Consume the settlement stream until `shutdown` fires.
    ///
    /// Lost subscriptions are re-established with backoff. Returns an error
    /// only when the reconnect budget is exhausted.
    pub async fn run(&self, shutdown: CancellationToken) -> EngineResult<()> {
        let mut attempt = 0u32;

        loop {
            if shutdown.is_cancelled() {
                info!("Settlement correlator stopping");
                return Ok(());
            }

            let mut subscribed = false;
            match self.consume(&shutdown, &mut subscribed).await {
                Ok(()) => info!("Settlement subscription closed"),
                Err(e) => error!(error = %e, "Settlement subscription error"),
            }

            if shutdown.is_cancelled() {
                info!("Settlement correlator stopping after disconnect");
                return Ok(());
            }

            if subscribed {
                attempt = 0;
            }
            attempt += 1;

            if self.reconnect.is_exhausted(attempt) {
                error!(attempt, "Settlement resubscription attempts exhausted");
                return Err(EngineError::StreamTerminated(format!(
                    "gave up after {attempt} attempts"
                )));
            }

            let delay = self.reconnect.delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Resubscribing to settlements");
            Metrics::stream_reconnect("settlements");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = shutdown.cancelled() => {
                    info!("Shutdown requested during settlement backoff");
                    return Ok(());
                }
            }
        }
    }

    async fn consume(&self, shutdown: &CancellationToken, subscribed: &mut bool) -> EngineResult<()> {
        let mut stream = self.ledger.subscribe_settlements().await?;
        *subscribed = true;
        info!("Settlement correlator subscribed");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                item = stream.next() => match item {
                    Some(Ok(event)) => self.dispatch(&event).await,
                    Some(Err(e)) if e.is_malformed() => {
                        warn!(error = %e, "Skipping malformed settlement event");
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        return Err(ChannelError::StreamTerminated("stream ended".to_string()).into());
                    }
                },
            }
        }
    }

    async fn dispatch(&self, event: &SettlementEvent) {
        match self.handle_event(event).await {
            Ok(outcome) => {
                if outcome != SettlementOutcome::Ignored {
                    Metrics::settlement(outcome.as_str());
                }
            }
            Err(e) => {
                error!(memo = %event.memo, pay_request = %event.pay_request, error = %e, "Failed to apply settlement");
            }
        }
    }
}
