//! Prometheus metrics and structured logging for the Lightning assets server.
//!
//! - Prometheus metrics for sweeps, rebalances, liquidations, settlements
//!   and hedge orders
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
