//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Unsupported asset: {0}")]
    UnknownAsset(String),

    #[error("Invalid price for {asset}: {price}")]
    InvalidPrice { asset: String, price: String },

    #[error("Arithmetic overflow converting {amount} {asset}")]
    Overflow { asset: String, amount: String },

    #[error("Invalid cross rate for {asset}: {factor}")]
    InvalidCrossRate { asset: String, factor: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Price stream terminated: {0}")]
    StreamTerminated(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type FeedResult<T> = Result<T, FeedError>;
