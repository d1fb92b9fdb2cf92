//! Append-only payment audit log.

use las_core::Payment;
use std::sync::Arc;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::ledger::{Bucket, Ledger, WriteOp};

#[derive(Clone)]
pub struct PaymentLog {
    ledger: Arc<dyn Ledger>,
}

impl PaymentLog {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Append a record under its generated id.
    pub fn append(&self, payment: &Payment) -> StoreResult<()> {
        let bytes = serde_json::to_vec(payment)?;
        self.ledger.transaction(&[WriteOp::put(
            Bucket::Payments,
            payment.id.as_bytes(),
            bytes,
        )])?;
        debug!(
            payment_id = %payment.id,
            contract_id = %payment.contract_id,
            amount_sats = payment.amount_sats.value(),
            outbound = payment.outbound,
            "Payment recorded"
        );
        Ok(())
    }

    /// All records, for operators and audits.
    pub fn entries(&self) -> StoreResult<Vec<Payment>> {
        self.ledger
            .scan(Bucket::Payments)?
            .into_iter()
            .map(|(_, v)| serde_json::from_slice(&v).map_err(StoreError::from))
            .collect()
    }
}
