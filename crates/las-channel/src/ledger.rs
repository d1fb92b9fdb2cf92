//! Channel ledger collaborator.

use futures_util::Stream;
use las_core::{BoxFuture, Sats};
use std::pin::Pin;

use crate::error::ChannelResult;

/// Lifecycle state of an invoice issued by this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceState {
    Open,
    Settled,
    Other,
}

impl InvoiceState {
    pub fn from_lnd(state: &str) -> Self {
        match state {
            "OPEN" => Self::Open,
            "SETTLED" => Self::Settled,
            _ => Self::Other,
        }
    }
}

/// Invoice update from the settlement stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementEvent {
    /// Correlation string of the invoice.
    pub pay_request: String,
    /// Invoice memo. Contract invoices carry the contract id.
    pub memo: String,
    pub state: InvoiceState,
    pub amount_paid: Sats,
}

impl SettlementEvent {
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.state == InvoiceState::Settled
    }
}

/// Result of paying an invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub payment_hash: String,
    pub preimage: String,
}

/// Ordered, unbounded stream of invoice updates.
///
/// `Err(ChannelError::Malformed)` items are recoverable; any other error
/// or the end of the stream means the subscription is gone.
pub type SettlementStream = Pin<Box<dyn Stream<Item = ChannelResult<SettlementEvent>> + Send>>;

/// Payment channel node collaborator.
pub trait ChannelLedger: Send + Sync {
    /// Open a new settlement subscription.
    fn subscribe_settlements(&self) -> BoxFuture<'_, ChannelResult<SettlementStream>>;

    /// Issue an invoice and return its pay request.
    fn add_invoice(&self, amount: Sats, memo: String) -> BoxFuture<'_, ChannelResult<String>>;

    /// Pay an invoice.
    fn pay(&self, pay_request: String) -> BoxFuture<'_, ChannelResult<PaymentOutcome>>;

    /// Amount encoded in a pay request.
    fn decode_amount(&self, pay_request: String) -> BoxFuture<'_, ChannelResult<Sats>>;
}
