//! Durable storage for the Lightning assets server.
//!
//! - `Ledger`: bucketed key-value storage with an atomic write batch
//! - `MemoryLedger`, `SledLedger`: in-process and on-disk ledgers
//! - `ContractRegistry`: contract CRUD and snapshot enumeration
//! - `PaymentLog`: append-only payment audit trail
//! - `ContractLocks`: per-contract mutation serialization

pub mod error;
pub mod ledger;
pub mod locks;
pub mod payments;
pub mod registry;
pub mod sled_ledger;

pub use error::{StoreError, StoreResult};
pub use ledger::{Bucket, Ledger, MemoryLedger, WriteOp};
pub use locks::ContractLocks;
pub use payments::PaymentLog;
pub use registry::{ContractRegistry, ContractScan};
pub use sled_ledger::SledLedger;
