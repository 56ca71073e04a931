//! HTTP API surface
//!
//! Thin layer over the runtime. Creation never blocks on planner or worker
//! calls; it persists initial state, schedules the first wake-up, and
//! returns the conversation id immediately.
//!
//! # Endpoints
//!
//! - POST /conversations - Create a conversation
//! - GET /conversations/:id - Full persisted record, read-only
//! - POST /conversations/:id/stop - Force stop
//! - GET /health - Liveness probe

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use sdk::errors::EngineError;
use sdk::types::{
    CreateConversationRequest, CreateConversationResponse, StopConversationResponse,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::runtime::Runtime;

/// Server state shared across handlers
#[derive(Clone)]
struct ServerState {
    runtime: Arc<Runtime>,
}

/// Engine error mapped onto an HTTP response
struct ApiError(EngineError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::Config(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

/// Build the API router
pub fn router(runtime: Arc<Runtime>) -> Router {
    Router::new()
        .route("/conversations", post(create_handler))
        .route("/conversations/:id", get(status_handler))
        .route("/conversations/:id/stop", post(stop_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(ServerState { runtime })
}

/// Bind the API to an address and spawn the accept loop.
///
/// Returns the bound address (useful with port 0) and the server task.
pub async fn start(
    runtime: Arc<Runtime>,
    bind_addr: &str,
) -> anyhow::Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;
    let app = router(runtime);

    info!("API listening on http://{}", addr);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server stopped: {}", e);
        }
    });

    Ok((addr, handle))
}

async fn create_handler(
    State(state): State<ServerState>,
    Json(request): Json<CreateConversationRequest>,
) -> Result<Json<CreateConversationResponse>, ApiError> {
    let conversation_id = state.runtime.create(request).await?;
    Ok(Json(CreateConversationResponse { conversation_id }))
}

async fn status_handler(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let snapshot = state.runtime.status(&id).await?;
    Ok(Json(snapshot).into_response())
}

async fn stop_handler(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Json<StopConversationResponse>, ApiError> {
    let snapshot = state.runtime.force_stop(&id).await?;
    Ok(Json(StopConversationResponse {
        conversation_id: snapshot.id,
        status: snapshot.status,
        stop_reason: snapshot.stop_reason.unwrap_or_default(),
    }))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
