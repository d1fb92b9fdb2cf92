//! HTTP server implementation using axum.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use las_core::Contract;
use las_engine::{ContractService, NewContractRequest, NewContractResponse};
use las_telemetry::Metrics;
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};

/// Shared application state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    service: Arc<ContractService>,
}

impl AppState {
    pub fn new(service: Arc<ContractService>) -> Self {
        Self { service }
    }
}

#[derive(Debug, Serialize)]
struct AssetsResponse {
    supported_assets: Vec<String>,
}

/// Create the axum router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/contracts", get(list_contracts).post(new_contract))
        .route("/v1/contracts/{id}", get(get_contract).delete(close_contract))
        .route("/v1/assets", get(list_assets))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn new_contract(
    State(state): State<AppState>,
    Json(req): Json<NewContractRequest>,
) -> ApiResult<Json<NewContractResponse>> {
    debug!(asset = %req.asset, contract_type = %req.contract_type, "NewContract");
    Ok(Json(state.service.new_contract(req).await?))
}

async fn close_contract(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.service.close_contract(&id).await?;
    Ok(Json(json!({})))
}

async fn get_contract(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Contract>> {
    Ok(Json(state.service.get_contract(&id)?))
}

async fn list_contracts(State(state): State<AppState>) -> ApiResult<Json<Vec<Contract>>> {
    Ok(Json(state.service.list_contracts()?))
}

async fn list_assets(State(state): State<AppState>) -> Json<AssetsResponse> {
    Json(AssetsResponse {
        supported_assets: state.service.list_assets(),
    })
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics() -> Result<Response, ApiError> {
    let body = Metrics::render()?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

/// Serve the API until `shutdown` is cancelled.
pub async fn run_server(
    state: AppState,
    config: ApiConfig,
    shutdown: CancellationToken,
) -> ApiResult<()> {
    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!(%addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("API server stopped");
    Ok(())
}
