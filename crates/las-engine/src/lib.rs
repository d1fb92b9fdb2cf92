//! Contract lifecycle engine for the Lightning assets server.
//!
//! - `SettlementCorrelator`: settled invoices into deposit flags and opening hedges
//! - `RebalanceEngine`: serialized sweeps keeping collateral at the notional's value
//! - `RebalanceExchange`: SEND/RECEIVE collateral exchange with the peer daemon
//! - `InvoiceDesk`: audited invoices and payments with bounded calls
//! - `PriceUpdater`: price writes, each followed by exactly one sweep
//! - `ContractService`: NewContract, CloseContract and ListAssets

pub mod correlator;
pub mod error;
pub mod exchange;
pub mod invoices;
pub mod prices;
pub mod rebalance;
pub mod service;

pub use correlator::{SettlementCorrelator, SettlementOutcome};
pub use error::{EngineError, EngineResult, ServiceError, ServiceResult};
pub use exchange::{ExchangeReceipt, RebalanceExchange};
pub use invoices::{bounded, InvoiceDesk};
pub use prices::PriceUpdater;
pub use rebalance::{RebalanceEngine, RebalanceOutcome, SweepReport, SweepTrigger};
pub use service::{ContractService, NewContractRequest, NewContractResponse};
