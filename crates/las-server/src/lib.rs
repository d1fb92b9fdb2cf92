//! Lightning assets server.
//!
//! Composes the daemon from its parts:
//! - Sled-backed contract registry and payment log
//! - LND REST node and HTTP peer daemons for collateral
//! - BitMEX price feed driving the rebalance engine
//! - Paper hedge venue
//! - HTTP request API

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
