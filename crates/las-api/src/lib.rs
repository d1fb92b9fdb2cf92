//! HTTP request surface for the Lightning assets server.
//!
//! - `POST /v1/contracts`: create a contract and return its deposit invoices
//! - `DELETE /v1/contracts/{id}`: close a contract and sell its hedge
//! - `GET /v1/contracts[/{id}]`: stored contracts
//! - `GET /v1/assets`: supported asset symbols
//! - `GET /health`, `GET /metrics`

pub mod config;
pub mod error;
pub mod server;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use server::{create_router, run_server, AppState};
