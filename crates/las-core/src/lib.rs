//! Core domain types for the Lightning assets server.
//!
//! This crate provides the fundamental types shared by every other crate:
//! - `Contract`, `ContractId`, `ContractType`: synthetic asset contracts
//! - `Payment`: append-only audit record of invoices and payments
//! - `Price`, `Quantity`, `Sats`: precision-safe numeric types
//! - `RebalanceDirection`, `OrderSide`, `IdempotencyKey`: engine enums and keys
//! - `ReconnectPolicy`: backoff schedule for supervised stream loops

pub mod contract;
pub mod decimal;
pub mod error;
pub mod order;
pub mod payment;
pub mod retry;

pub use contract::{Contract, ContractId, ContractType, NotOpenReason, Readiness};
pub use decimal::{expected_sats, Price, Quantity, Sats, SATS_PER_UNIT};
pub use error::{CoreError, Result};
pub use order::{IdempotencyKey, OrderSide, RebalanceDirection};
pub use payment::Payment;
pub use retry::ReconnectPolicy;

use std::future::Future;
use std::pin::Pin;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
