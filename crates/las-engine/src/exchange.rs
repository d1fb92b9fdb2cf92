//! Collateral exchange with a contract's peer daemon.
//!
//! SEND: the peer issues an invoice for the surplus and we pay it.
//! RECEIVE: we issue an invoice for the deficit and the peer agrees to pay
//! it. The settlement of a RECEIVE invoice arrives later through the
//! settlement correlator.

use las_channel::PeerConnector;
use las_core::{Contract, RebalanceDirection, Sats};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::invoices::{bounded, InvoiceDesk};

/// Completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeReceipt {
    pub direction: RebalanceDirection,
    pub delta: Sats,
    /// Invoice that moved the collateral.
    pub pay_request: String,
}

impl ExchangeReceipt {
    /// Collateral held after applying this exchange to `held`.
    pub fn apply(&self, held: Sats) -> Sats {
        match self.direction {
            RebalanceDirection::Send => held - self.delta,
            RebalanceDirection::Receive => held + self.delta,
        }
    }
}

pub struct RebalanceExchange {
    desk: Arc<InvoiceDesk>,
    peers: Arc<dyn PeerConnector>,
}

impl RebalanceExchange {
    pub fn new(desk: Arc<InvoiceDesk>, peers: Arc<dyn PeerConnector>) -> Self {
        Self { desk, peers }
    }

    /// Move `delta` satoshis in `direction` between us and the contract's peer.
    ///
    /// Nothing is paid unless the peer's invoice is for exactly `delta`.
    pub async fn execute(
        &self,
        contract: &Contract,
        direction: RebalanceDirection,
        delta: Sats,
    ) -> EngineResult<ExchangeReceipt> {
        let peer = self.peers.connect(&contract.client_host)?;
        let timeout = self.desk.call_timeout();

        let pay_request = match direction {
            RebalanceDirection::Send => {
                let pay_request =
                    bounded(timeout, "peer pay request", peer.request_pay_request(delta)).await?;
                let decoded = self.desk.decode(&pay_request).await?;
                if decoded != delta {
                    return Err(EngineError::AmountMismatch {
                        requested: delta,
                        decoded,
                    });
                }
                debug!(contract_id = %contract.id, delta_sats = delta.value(), "Paying peer invoice");
                self.desk.pay(&contract.id, pay_request.clone(), delta).await?;
                pay_request
            }
            RebalanceDirection::Receive => {
                let pay_request = self.desk.issue(&contract.id, delta).await?;
                bounded(timeout, "peer payment", peer.request_payment(pay_request.clone())).await?;
                pay_request
            }
        };

        info!(
            contract_id = %contract.id,
            host = %contract.client_host,
            %direction,
            delta_sats = delta.value(),
            "Collateral exchanged"
        );
        Ok(ExchangeReceipt {
            direction,
            delta,
            pay_request,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use las_channel::{MockChannelLedger, MockPeerConnector};
    use las_core::{ContractId, ContractType, Quantity};
    use las_store::{MemoryLedger, PaymentLog};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct Fixture {
        ledger: Arc<MockChannelLedger>,
        peers: Arc<MockPeerConnector>,
        exchange: RebalanceExchange,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(MockChannelLedger::new());
        let peers = Arc::new(MockPeerConnector::new());
        let desk = Arc::new(InvoiceDesk::new(
            ledger.clone(),
            PaymentLog::new(Arc::new(MemoryLedger::new())),
            Duration::from_secs(1),
        ));
        Fixture {
            ledger,
            peers: peers.clone(),
            exchange: RebalanceExchange::new(desk, peers),
        }
    }

    fn sample_contract() -> Contract {
        Contract::new(
            ContractId::new(),
            "USD",
            Quantity::new(dec!(100)),
            Sats(10_000_000_000),
            ContractType::Unfunded,
            "peer:10456",
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_send_pays_peer_invoice() {
        let f = fixture();
        let contract = sample_contract();

        let receipt = f
            .exchange
            .execute(&contract, RebalanceDirection::Send, Sats(500))
            .await
            .unwrap();

        assert_eq!(f.peers.peer().invoice_requests(), vec![Sats(500)]);
        assert_eq!(f.ledger.payments(), vec![receipt.pay_request.clone()]);
        assert_eq!(receipt.apply(Sats(1_500)), Sats(1_000));
        assert_eq!(f.peers.hosts(), vec!["peer:10456".to_string()]);
    }

    #[tokio::test]
    async fn test_send_rejects_wrong_amount() {
        let f = fixture();
        let contract = sample_contract();
        // The shared mock peer numbers its requests from 1_000_001.
        f.ledger
            .set_decoded_amount(las_channel::mock_pay_request(Sats(500), 1_000_001), Sats(900));

        let err = f
            .exchange
            .execute(&contract, RebalanceDirection::Send, Sats(500))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EngineError::AmountMismatch {
                requested: Sats(500),
                decoded: Sats(900)
            }
        ));
        assert!(f.ledger.payments().is_empty());
    }

    #[tokio::test]
    async fn test_receive_sends_our_invoice() {
        let f = fixture();
        let contract = sample_contract();

        let receipt = f
            .exchange
            .execute(&contract, RebalanceDirection::Receive, Sats(700))
            .await
            .unwrap();

        let invoices = f.ledger.invoices();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].amount, Sats(700));
        assert_eq!(invoices[0].memo, contract.id.to_string());
        assert_eq!(f.peers.peer().payment_requests(), vec![receipt.pay_request.clone()]);
        assert_eq!(receipt.apply(Sats(1_000)), Sats(1_700));
    }

    #[tokio::test]
    async fn test_peer_failure_aborts() {
        let f = fixture();
        f.peers.peer().set_fail(true);

        let err = f
            .exchange
            .execute(&sample_contract(), RebalanceDirection::Send, Sats(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Channel(_)));
        assert!(f.ledger.payments().is_empty());
    }
}
