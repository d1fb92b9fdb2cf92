//! Hedge venue abstraction and hedge controller.
//!
//! - `HedgeVenue`: market orders on a derivatives venue
//! - `PaperVenue`: immediate-fill venue for paper trading
//! - `MockHedgeVenue`: recording venue for tests
//! - `HedgeController`: sizes, bounds and deduplicates hedge orders

pub mod controller;
pub mod error;
pub mod venue;

pub use controller::HedgeController;
pub use error::{HedgeError, HedgeResult};
pub use venue::{HedgeVenue, MockHedgeVenue, PaperVenue, VenueCall, VenueOrder};
