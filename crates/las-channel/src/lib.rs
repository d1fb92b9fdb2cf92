//! Payment channel ledger and peer daemon clients.
//!
//! - `ChannelLedger`: invoices, payments and the settlement stream
//! - `PeerClient`, `PeerConnector`: the remote side of collateral exchanges
//! - `LndRestLedger`: LND REST gateway implementation
//! - `HttpPeerConnector`: JSON-over-HTTP peer daemon client
//! - `MockChannelLedger`, `MockPeerConnector`: recording doubles for tests

pub mod error;
pub mod ledger;
pub mod lnd;
pub mod mock;
pub mod peer;

pub use error::{ChannelError, ChannelResult};
pub use ledger::{ChannelLedger, InvoiceState, PaymentOutcome, SettlementEvent, SettlementStream};
pub use lnd::{LndConfig, LndRestLedger};
pub use mock::{mock_pay_request, IssuedInvoice, MockChannelLedger, MockPeer, MockPeerConnector};
pub use peer::{HttpPeerClient, HttpPeerConnector, PeerClient, PeerConnector};
