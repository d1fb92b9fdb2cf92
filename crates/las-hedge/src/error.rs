//! Hedge error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HedgeError {
    #[error("Venue error: {0}")]
    Venue(String),

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("Sizing failed: {0}")]
    Sizing(#[from] las_feed::FeedError),
}

pub type HedgeResult<T> = Result<T, HedgeError>;
