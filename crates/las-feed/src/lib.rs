//! Price table and price feed ingestion.
//!
//! - `PriceTable`: process-wide asset prices with cross-rate propagation
//! - `PriceTick`, `TickFilter`: material price changes only
//! - `BitmexParser`: instrument stream messages into ticks
//! - `PriceFeed`, `BitmexFeed`: supervised websocket price source

pub mod bitmex;
pub mod error;
pub mod feed;
pub mod price_table;
pub mod tick;

pub use bitmex::BitmexParser;
pub use error::{FeedError, FeedResult};
pub use feed::{init_crypto, BitmexFeed, BitmexFeedConfig, PriceFeed};
pub use price_table::PriceTable;
pub use tick::{PriceTick, TickFilter};
