//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Store(#[from] las_store::StoreError),

    #[error("Feed error: {0}")]
    Feed(#[from] las_feed::FeedError),

    #[error("Channel error: {0}")]
    Channel(#[from] las_channel::ChannelError),

    #[error("Engine error: {0}")]
    Engine(#[from] las_engine::EngineError),

    #[error("API error: {0}")]
    Api(#[from] las_api::ApiError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] las_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
