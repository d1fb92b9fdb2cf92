//! Shared wiring for engine integration tests.
//!
//! Builds the full engine over an in-memory ledger, a mock channel node, a
//! mock peer daemon and a mock hedge venue.

#![allow(dead_code)]

use chrono::Utc;
use las_channel::{
    mock_pay_request, ChannelResult, MockChannelLedger, MockPeer, MockPeerConnector, PeerClient,
    PeerConnector,
};
use las_core::{BoxFuture, Contract, ContractId, Price, Sats};
use las_engine::{
    ContractService, InvoiceDesk, NewContractRequest, PriceUpdater, RebalanceEngine,
    RebalanceExchange, SettlementCorrelator, SettlementOutcome,
};
use las_feed::PriceTable;
use las_hedge::{HedgeController, MockHedgeVenue};
use las_store::{
    Bucket, ContractLocks, ContractRegistry, Ledger, MemoryLedger, PaymentLog, StoreError,
    StoreResult, WriteOp,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const STALENESS: Duration = Duration::from_secs(30);

/// Memory ledger whose writes can be made to fail.
#[derive(Default)]
pub struct FlakyLedger {
    inner: MemoryLedger,
    fail_writes: AtomicBool,
}

impl FlakyLedger {
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl Ledger for FlakyLedger {
    fn get(&self, bucket: Bucket, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get(bucket, key)
    }

    fn scan(&self, bucket: Bucket) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.inner.scan(bucket)
    }

    fn transaction(&self, ops: &[WriteOp]) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Transaction("injected write failure".to_string()));
        }
        self.inner.transaction(ops)
    }
}

/// Peer daemon that answers after a delay and tracks overlapping calls.
pub struct SlowPeer {
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
    next_id: AtomicU64,
}

impl SlowPeer {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        })
    }

    /// Most calls ever in progress at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn answer(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl PeerClient for SlowPeer {
    fn request_pay_request(&self, amount: Sats) -> BoxFuture<'_, ChannelResult<String>> {
        Box::pin(async move {
            self.answer().await;
            Ok(mock_pay_request(amount, self.next_id.fetch_add(1, Ordering::SeqCst)))
        })
    }

    fn request_payment(&self, _pay_request: String) -> BoxFuture<'_, ChannelResult<()>> {
        Box::pin(async move {
            self.answer().await;
            Ok(())
        })
    }
}

/// Hands out the same `SlowPeer` for every host.
pub struct SlowPeerConnector(pub Arc<SlowPeer>);

impl PeerConnector for SlowPeerConnector {
    fn connect(&self, _host: &str) -> ChannelResult<Arc<dyn PeerClient>> {
        Ok(self.0.clone())
    }
}

pub struct Harness {
    pub storage: Arc<FlakyLedger>,
    pub registry: ContractRegistry,
    pub payments: PaymentLog,
    pub prices: Arc<PriceTable>,
    pub venue: Arc<MockHedgeVenue>,
    pub ledger: Arc<MockChannelLedger>,
    pub peers: Arc<MockPeerConnector>,
    pub engine: Arc<RebalanceEngine>,
    pub correlator: SettlementCorrelator,
    pub updater: PriceUpdater,
    pub service: ContractService,
}

impl Harness {
    /// USD reference, NOK at 10 per USD, USD priced at 1, 1% margin.
    pub fn new() -> Self {
        let peers = Arc::new(MockPeerConnector::new());
        Self::assemble(peers.clone(), peers)
    }

    /// Same wiring, with exchanges going through `connector`.
    pub fn with_peer_connector(connector: Arc<dyn PeerConnector>) -> Self {
        Self::assemble(Arc::new(MockPeerConnector::new()), connector)
    }

    fn assemble(peers: Arc<MockPeerConnector>, connector: Arc<dyn PeerConnector>) -> Self {
        let storage = Arc::new(FlakyLedger::default());
        let registry = ContractRegistry::new(storage.clone());
        let payments = PaymentLog::new(storage.clone());
        let locks = ContractLocks::new();
        let call_timeout = Duration::from_secs(1);

        let prices = Arc::new(
            PriceTable::new(
                "USD",
                [
                    ("USD".to_string(), dec!(1)),
                    ("NOK".to_string(), dec!(10)),
                ],
            )
            .unwrap(),
        );
        prices.set("USD", Price::new(dec!(1))).unwrap();

        let venue = Arc::new(MockHedgeVenue::new());
        let hedge = Arc::new(HedgeController::new(
            venue.clone(),
            prices.clone(),
            call_timeout,
        ));
        let ledger = Arc::new(MockChannelLedger::new());
        let desk = Arc::new(InvoiceDesk::new(
            ledger.clone(),
            payments.clone(),
            call_timeout,
        ));
        let engine = Arc::new(RebalanceEngine::new(
            registry.clone(),
            prices.clone(),
            hedge.clone(),
            RebalanceExchange::new(desk.clone(), connector),
            locks.clone(),
            STALENESS,
        ));
        let correlator = SettlementCorrelator::new(
            registry.clone(),
            hedge.clone(),
            locks.clone(),
            ledger.clone(),
            Default::default(),
        );
        let updater = PriceUpdater::new(prices.clone(), engine.clone());
        let service = ContractService::new(
            registry.clone(),
            prices.clone(),
            hedge,
            desk,
            engine.clone(),
            locks,
            dec!(1),
        );

        Self {
            storage,
            registry,
            payments,
            prices,
            venue,
            ledger,
            peers,
            engine,
            correlator,
            updater,
            service,
        }
    }

    pub fn peer(&self) -> Arc<MockPeer> {
        self.peers.peer()
    }

    pub fn contract(&self, id: &str) -> Contract {
        self.registry.get(&ContractId::from_string(id.to_string())).unwrap()
    }

    /// Deliver the settlement of an invoice issued through the mock node.
    pub async fn settle(&self, pay_request: &str) -> SettlementOutcome {
        let event = self.ledger.settle(pay_request).unwrap();
        self.correlator.handle_event(&event).await.unwrap()
    }

    /// Create a contract and pay its deposits. Returns the contract id.
    pub async fn open_contract(&self, request: NewContractRequest) -> String {
        let response = self.service.new_contract(request).await.unwrap();
        self.settle(&response.margin_pay_request).await;
        if let Some(initiating) = &response.initiating_pay_request {
            self.settle(initiating).await;
        }
        response.id
    }

    /// Move a contract's staleness clock into the past.
    pub fn age(&self, id: &str, by: Duration) {
        let mut contract = self.contract(id);
        contract.last_rebalanced_at = Utc::now() - chrono::Duration::from_std(by).unwrap();
        self.registry.put(&contract).unwrap();
    }
}

pub fn request(asset: &str, amount: Decimal, contract_type: &str) -> NewContractRequest {
    NewContractRequest {
        asset: asset.to_string(),
        amount,
        host: "peer.example:10456".to_string(),
        contract_type: contract_type.to_string(),
    }
}

pub fn unfunded(asset: &str, amount: Decimal) -> NewContractRequest {
    request(asset, amount, "UNFUNDED")
}

pub fn funded(asset: &str, amount: Decimal) -> NewContractRequest {
    request(asset, amount, "FUNDED")
}
