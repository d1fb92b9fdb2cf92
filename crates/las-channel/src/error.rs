//! Channel error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Request failed: HTTP {status}: {body}")]
    Rpc { status: u16, body: String },

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Peer error: {0}")]
    Peer(String),

    #[error("Malformed settlement event: {0}")]
    Malformed(String),

    #[error("Settlement stream terminated: {0}")]
    StreamTerminated(String),

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChannelError {
    /// A single bad event; the stream itself is still usable.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

impl From<reqwest::Error> for ChannelError {
    fn from(e: reqwest::Error) -> Self {
        Self::HttpClient(e.to_string())
    }
}

pub type ChannelResult<T> = Result<T, ChannelError>;
