//! Audited access to the channel ledger.
//!
//! Every invoice issued and every payment made on behalf of a contract is
//! appended to the payment log. An audit write failure is logged; it never
//! turns a completed channel operation into a failed one.

use las_channel::{ChannelError, ChannelLedger, ChannelResult, PaymentOutcome};
use las_core::{ContractId, Payment, Sats};
use las_store::PaymentLog;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Run `call`, failing with `ChannelError::Timeout` after `limit`.
pub async fn bounded<T, F>(limit: Duration, operation: &str, call: F) -> ChannelResult<T>
where
    F: Future<Output = ChannelResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ChannelError::Timeout {
            operation: operation.to_string(),
            after_ms: limit.as_millis() as u64,
        }),
    }
}

pub struct InvoiceDesk {
    ledger: Arc<dyn ChannelLedger>,
    payments: PaymentLog,
    call_timeout: Duration,
}

impl InvoiceDesk {
    pub fn new(ledger: Arc<dyn ChannelLedger>, payments: PaymentLog, call_timeout: Duration) -> Self {
        Self {
            ledger,
            payments,
            call_timeout,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn ChannelLedger> {
        &self.ledger
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Issue an invoice for `amount` whose memo is the contract id.
    pub async fn issue(&self, contract_id: &ContractId, amount: Sats) -> ChannelResult<String> {
        let pay_request = bounded(
            self.call_timeout,
            "add invoice",
            self.ledger.add_invoice(amount, contract_id.to_string()),
        )
        .await?;
        debug!(%contract_id, amount_sats = amount.value(), "Invoice issued");
        self.audit(Payment::inbound(contract_id.clone(), amount, pay_request.clone()));
        Ok(pay_request)
    }

    /// Pay `pay_request` for a contract.
    pub async fn pay(
        &self,
        contract_id: &ContractId,
        pay_request: String,
        amount: Sats,
    ) -> ChannelResult<PaymentOutcome> {
        let outcome = bounded(
            self.call_timeout,
            "pay invoice",
            self.ledger.pay(pay_request.clone()),
        )
        .await?;
        debug!(%contract_id, amount_sats = amount.value(), payment_hash = %outcome.payment_hash, "Invoice paid");
        self.audit(Payment::outbound(contract_id.clone(), amount, pay_request));
        Ok(outcome)
    }

    /// Amount encoded in a pay request.
    pub async fn decode(&self, pay_request: &str) -> ChannelResult<Sats> {
        bounded(
            self.call_timeout,
            "decode pay request",
            self.ledger.decode_amount(pay_request.to_string()),
        )
        .await
    }

    fn audit(&self, payment: Payment) {
        if let Err(e) = self.payments.append(&payment) {
            warn!(
                contract_id = %payment.contract_id,
                pay_request = %payment.pay_request,
                error = %e,
                "Failed to record payment"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use las_channel::MockChannelLedger;
    use las_store::MemoryLedger;

    fn desk() -> (Arc<MockChannelLedger>, PaymentLog, InvoiceDesk) {
        let ledger = Arc::new(MockChannelLedger::new());
        let log = PaymentLog::new(Arc::new(MemoryLedger::new()));
        let desk = InvoiceDesk::new(ledger.clone(), log.clone(), Duration::from_secs(1));
        (ledger, log, desk)
    }

    #[tokio::test]
    async fn test_issue_uses_contract_id_memo_and_audits() {
        let (ledger, log, desk) = desk();
        let id = ContractId::new();

        let pr = desk.issue(&id, Sats(1_000)).await.unwrap();

        let invoices = ledger.invoices();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].memo, id.to_string());
        assert_eq!(invoices[0].pay_request, pr);

        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].outbound);
        assert_eq!(entries[0].amount_sats, Sats(1_000));
    }

    #[tokio::test]
    async fn test_pay_audits_outbound() {
        let (ledger, log, desk) = desk();
        let id = ContractId::new();

        desk.pay(&id, "lnmock5n9".to_string(), Sats(5)).await.unwrap();

        assert_eq!(ledger.payments(), vec!["lnmock5n9".to_string()]);
        let entries = log.entries().unwrap();
        assert!(entries[0].outbound);
    }

    #[tokio::test]
    async fn test_failed_payment_is_not_audited() {
        let (ledger, log, desk) = desk();
        ledger.set_fail_payments(true);

        let result = desk.pay(&ContractId::new(), "lnmock5n9".to_string(), Sats(5)).await;
        assert!(result.is_err());
        assert!(log.entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, ChannelError>(())
        };
        let err = bounded(Duration::from_millis(10), "slow call", slow)
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Timeout { after_ms: 10, .. }));
    }
}
