use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::domain::{ContractCall, ExecutionStats, Principal, Receipt, StrategyRecord};
use crate::engine::host::ContractHost;

pub struct AppState {
    pub host: ContractHost,
    pub contract_name: String,
    pub start_time: Instant,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/call", post(call))
        .route("/api/strategy", get(strategy))
        .route("/api/stats", get(stats))
        .route("/api/receipts", get(receipts))
        .route("/api/status", get(status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Transaction envelope: the sender travels beside the call, not inside it.
#[derive(Deserialize)]
struct CallRequest {
    sender: Principal,
    call: ContractCall,
}

// Parsed straight from the body bytes: `ContractCall` captures its args as a
// raw JSON slice, which needs serde_json's own deserializer.
async fn call(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Receipt>, StatusCode> {
    let req: CallRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!("Rejected malformed call: {}", e);
        StatusCode::UNPROCESSABLE_ENTITY
    })?;
    state
        .host
        .submit(req.sender, req.call)
        .await
        .map(Json)
        .map_err(|e| {
            error!("Failed to apply call: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

async fn strategy(State(state): State<Arc<AppState>>) -> Json<Option<StrategyRecord>> {
    Json(state.host.strategy().await)
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<ExecutionStats> {
    Json(state.host.stats().await)
}

#[derive(Deserialize)]
struct ReceiptsQuery {
    limit: Option<i64>,
}

async fn receipts(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ReceiptsQuery>,
) -> Result<Json<Vec<Receipt>>, StatusCode> {
    let limit = q.limit.unwrap_or(100).clamp(1, 1000);
    state.host.recent_receipts(limit).await.map(Json).map_err(|e| {
        error!("Failed to load receipts: {:?}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

#[derive(Serialize)]
struct StatusResponse {
    contract_name: String,
    admin: Principal,
    block_height: u64,
    registered: bool,
    uptime_secs: u64,
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let snapshot = state.host.snapshot().await;
    Json(StatusResponse {
        contract_name: state.contract_name.clone(),
        admin: snapshot.admin,
        block_height: snapshot.block_height,
        registered: snapshot.registered,
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
