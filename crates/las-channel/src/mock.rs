//! Recording doubles for the channel ledger and peer daemons.
//!
//! Pay requests issued by the mocks encode their amount, so
//! `decode_amount` works on any of them without a registry.

use futures_util::stream::{self, StreamExt};
use las_core::{BoxFuture, Sats};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::{ChannelError, ChannelResult};
use crate::ledger::{ChannelLedger, InvoiceState, PaymentOutcome, SettlementEvent, SettlementStream};
use crate::peer::{PeerClient, PeerConnector};

const MOCK_PREFIX: &str = "lnmock";

/// Pay request string carrying `amount`, unique per `n`.
pub fn mock_pay_request(amount: Sats, n: u64) -> String {
    format!("{MOCK_PREFIX}{}n{n}", amount.value())
}

fn parse_mock_pay_request(pay_request: &str) -> Option<Sats> {
    let rest = pay_request.strip_prefix(MOCK_PREFIX)?;
    let (amount, _) = rest.split_once('n')?;
    amount.parse().ok().map(Sats)
}

// ============================================================================
// MockChannelLedger
// ============================================================================

/// Invoice issued through the mock ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedInvoice {
    pub amount: Sats,
    pub memo: String,
    pub pay_request: String,
}

/// Mock channel ledger for testing.
///
/// Each `subscribe_settlements` call consumes one scripted session pushed
/// with `push_session`. Once the script is used up, subscriptions become
/// live and receive whatever `emit` sends.
#[derive(Debug, Default)]
pub struct MockChannelLedger {
    sessions: Mutex<VecDeque<Vec<ChannelResult<SettlementEvent>>>>,
    live: Mutex<Option<mpsc::UnboundedSender<ChannelResult<SettlementEvent>>>>,
    subscriptions: AtomicU64,
    invoices: Mutex<Vec<IssuedInvoice>>,
    payments: Mutex<Vec<String>>,
    decoded_override: Mutex<HashMap<String, Sats>>,
    next_id: AtomicU64,
    fail_invoices: AtomicBool,
    fail_payments: AtomicBool,
    fail_subscribe: AtomicBool,
}

impl MockChannelLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the items of the next subscription. The stream ends after them.
    pub fn push_session(&self, items: Vec<ChannelResult<SettlementEvent>>) {
        self.sessions.lock().push_back(items);
    }

    /// Deliver an item to the current live subscription.
    ///
    /// Returns false if nobody is subscribed.
    pub fn emit(&self, item: ChannelResult<SettlementEvent>) -> bool {
        match self.live.lock().as_ref() {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }

    /// End the live subscription.
    pub fn close_live(&self) {
        self.live.lock().take();
    }

    /// Settled event for an invoice this ledger issued.
    pub fn settle(&self, pay_request: &str) -> Option<SettlementEvent> {
        self.invoices
            .lock()
            .iter()
            .find(|inv| inv.pay_request == pay_request)
            .map(|inv| SettlementEvent {
                pay_request: inv.pay_request.clone(),
                memo: inv.memo.clone(),
                state: InvoiceState::Settled,
                amount_paid: inv.amount,
            })
    }

    pub fn subscriptions(&self) -> u64 {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn invoices(&self) -> Vec<IssuedInvoice> {
        self.invoices.lock().clone()
    }

    /// Pay requests paid so far, in order.
    pub fn payments(&self) -> Vec<String> {
        self.payments.lock().clone()
    }

    /// Make `decode_amount` report `amount` for `pay_request`.
    pub fn set_decoded_amount(&self, pay_request: impl Into<String>, amount: Sats) {
        self.decoded_override.lock().insert(pay_request.into(), amount);
    }

    pub fn set_fail_invoices(&self, fail: bool) {
        self.fail_invoices.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_payments(&self, fail: bool) {
        self.fail_payments.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    fn subscribe(&self) -> ChannelResult<SettlementStream> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(ChannelError::Rpc {
                status: 503,
                body: "mock subscribe failure".to_string(),
            });
        }
        if let Some(items) = self.sessions.lock().pop_front() {
            let stream: SettlementStream = Box::pin(stream::iter(items));
            return Ok(stream);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.live.lock() = Some(tx);
        let stream = stream::unfold(rx, |mut rx| async move {
            let item = rx.recv().await?;
            Some((item, rx))
        });
        let stream: SettlementStream = Box::pin(stream.fuse());
        Ok(stream)
    }

    fn issue(&self, amount: Sats, memo: String) -> ChannelResult<String> {
        if self.fail_invoices.load(Ordering::SeqCst) {
            return Err(ChannelError::Rpc {
                status: 500,
                body: "mock invoice failure".to_string(),
            });
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let pay_request = mock_pay_request(amount, n);
        self.invoices.lock().push(IssuedInvoice {
            amount,
            memo,
            pay_request: pay_request.clone(),
        });
        Ok(pay_request)
    }

    fn record_payment(&self, pay_request: String) -> ChannelResult<PaymentOutcome> {
        if self.fail_payments.load(Ordering::SeqCst) {
            return Err(ChannelError::PaymentFailed("mock payment failure".to_string()));
        }
        let n = {
            let mut payments = self.payments.lock();
            payments.push(pay_request);
            payments.len()
        };
        Ok(PaymentOutcome {
            payment_hash: format!("hash-{n}"),
            preimage: format!("preimage-{n}"),
        })
    }

    fn decode(&self, pay_request: &str) -> ChannelResult<Sats> {
        if let Some(amount) = self.decoded_override.lock().get(pay_request) {
            return Ok(*amount);
        }
        parse_mock_pay_request(pay_request)
            .ok_or_else(|| ChannelError::Rpc {
                status: 400,
                body: format!("cannot decode {pay_request}"),
            })
    }
}

impl ChannelLedger for MockChannelLedger {
    fn subscribe_settlements(&self) -> BoxFuture<'_, ChannelResult<SettlementStream>> {
        Box::pin(async move { self.subscribe() })
    }

    fn add_invoice(&self, amount: Sats, memo: String) -> BoxFuture<'_, ChannelResult<String>> {
        Box::pin(async move { self.issue(amount, memo) })
    }

    fn pay(&self, pay_request: String) -> BoxFuture<'_, ChannelResult<PaymentOutcome>> {
        Box::pin(async move { self.record_payment(pay_request) })
    }

    fn decode_amount(&self, pay_request: String) -> BoxFuture<'_, ChannelResult<Sats>> {
        Box::pin(async move { self.decode(&pay_request) })
    }
}

// ============================================================================
// MockPeer
// ============================================================================

/// Mock peer daemon for testing.
#[derive(Debug, Default)]
pub struct MockPeer {
    /// Amounts asked for via `request_pay_request`.
    invoice_requests: Mutex<Vec<Sats>>,
    /// Pay requests the peer was asked to pay.
    payment_requests: Mutex<Vec<String>>,
    next_id: AtomicU64,
    fail: AtomicBool,
}

impl MockPeer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn invoice_requests(&self) -> Vec<Sats> {
        self.invoice_requests.lock().clone()
    }

    pub fn payment_requests(&self) -> Vec<String> {
        self.payment_requests.lock().clone()
    }

    fn check(&self) -> ChannelResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChannelError::Peer("mock peer failure".to_string()));
        }
        Ok(())
    }
}

impl PeerClient for MockPeer {
    fn request_pay_request(&self, amount: Sats) -> BoxFuture<'_, ChannelResult<String>> {
        Box::pin(async move {
            self.invoice_requests.lock().push(amount);
            self.check()?;
            // Peer-issued requests live in their own id space.
            let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1_000_001;
            Ok(mock_pay_request(amount, n))
        })
    }

    fn request_payment(&self, pay_request: String) -> BoxFuture<'_, ChannelResult<()>> {
        Box::pin(async move {
            self.payment_requests.lock().push(pay_request);
            self.check()
        })
    }
}

/// Hands out one shared `MockPeer` and records the hosts asked for.
#[derive(Debug, Default)]
pub struct MockPeerConnector {
    peer: Arc<MockPeer>,
    hosts: Mutex<Vec<String>>,
    refuse: AtomicBool,
}

impl MockPeerConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer(&self) -> Arc<MockPeer> {
        self.peer.clone()
    }

    pub fn hosts(&self) -> Vec<String> {
        self.hosts.lock().clone()
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl PeerConnector for MockPeerConnector {
    fn connect(&self, host: &str) -> ChannelResult<Arc<dyn PeerClient>> {
        self.hosts.lock().push(host.to_string());
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ChannelError::Peer(format!("cannot reach {host}")));
        }
        Ok(self.peer.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_pay_request_encodes_amount() {
        let pr = mock_pay_request(Sats(2500), 7);
        assert_eq!(pr, "lnmock2500n7");
        assert_eq!(parse_mock_pay_request(&pr), Some(Sats(2500)));
        assert_eq!(parse_mock_pay_request("lnbc1"), None);
    }

    #[tokio::test]
    async fn test_invoices_settle_and_decode() {
        let ledger = MockChannelLedger::new();
        let pr = ledger.add_invoice(Sats(900), "c-1".to_string()).await.unwrap();

        assert_eq!(ledger.decode_amount(pr.clone()).await.unwrap(), Sats(900));
        let event = ledger.settle(&pr).unwrap();
        assert_eq!(event.memo, "c-1");
        assert!(event.is_settled());

        ledger.set_decoded_amount(pr.clone(), Sats(1));
        assert_eq!(ledger.decode_amount(pr).await.unwrap(), Sats(1));
    }

    #[tokio::test]
    async fn test_scripted_session_then_live() {
        let ledger = MockChannelLedger::new();
        ledger.push_session(vec![Err(ChannelError::Malformed("x".to_string()))]);

        let mut first = ledger.subscribe_settlements().await.unwrap();
        assert!(first.next().await.unwrap().unwrap_err().is_malformed());
        assert!(first.next().await.is_none());

        let mut live = ledger.subscribe_settlements().await.unwrap();
        let event = SettlementEvent {
            pay_request: "lnmock1n1".to_string(),
            memo: String::new(),
            state: InvoiceState::Open,
            amount_paid: Sats::ZERO,
        };
        assert!(ledger.emit(Ok(event.clone())));
        assert_eq!(live.next().await.unwrap().unwrap(), event);

        ledger.close_live();
        assert!(live.next().await.is_none());
        assert_eq!(ledger.subscriptions(), 2);
    }

    #[tokio::test]
    async fn test_peer_records_and_fails() {
        let connector = MockPeerConnector::new();
        let peer = connector.connect("peer:1").unwrap();

        let pr = peer.request_pay_request(Sats(10)).await.unwrap();
        assert_eq!(parse_mock_pay_request(&pr), Some(Sats(10)));

        connector.peer().set_fail(true);
        assert!(peer.request_payment("lnmock5n1".to_string()).await.is_err());
        assert_eq!(connector.peer().payment_requests(), vec!["lnmock5n1".to_string()]);
        assert_eq!(connector.hosts(), vec!["peer:1".to_string()]);
    }
}
