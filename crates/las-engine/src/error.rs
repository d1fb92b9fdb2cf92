//! Engine and service error types.

use las_channel::ChannelError;
use las_core::Sats;
use las_feed::FeedError;
use las_hedge::HedgeError;
use las_store::StoreError;
use thiserror::Error;

/// Failures of background engine work (sweeps, settlements, exchanges).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Hedge error: {0}")]
    Hedge(#[from] HedgeError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Price error: {0}")]
    Price(#[from] FeedError),

    #[error("Peer invoice is for {decoded} but {requested} was requested")]
    AmountMismatch { requested: Sats, decoded: Sats },

    #[error("Settlement stream terminated: {0}")]
    StreamTerminated(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Failures of client requests.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("Contract not found: {0}")]
    NotFound(String),

    #[error("No price available for {0} yet")]
    PriceUnavailable(String),

    #[error("Hedge error: {0}")]
    Hedge(#[from] HedgeError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl ServiceError {
    /// A venue or channel node call failed.
    #[must_use]
    pub fn is_external(&self) -> bool {
        matches!(self, Self::Hedge(_) | Self::Channel(_))
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Storage(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
