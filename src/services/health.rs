//! Status HTTP server.
//!
//! Liveness probe for process supervision plus a small operational surface:
//! a status summary and a manual close endpoint for one strategy.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::Store;
use crate::error::FundarbError;
use crate::execution::ExecutionCoordinator;

/// Shared state for the status server
pub struct AppState {
    pub started_at: DateTime<Utc>,
    pub last_analysis: RwLock<Option<DateTime<Utc>>>,
    pub store: Arc<dyn Store>,
    pub coordinator: Arc<ExecutionCoordinator>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, coordinator: Arc<ExecutionCoordinator>) -> Arc<Self> {
        Arc::new(Self {
            started_at: Utc::now(),
            last_analysis: RwLock::new(None),
            store,
            coordinator,
        })
    }

    /// Called by the analysis loop after every completed cycle
    pub async fn record_analysis(&self) {
        *self.last_analysis.write().await = Some(Utc::now());
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub active_strategy_count: usize,
    pub last_analysis_time: Option<DateTime<Utc>>,
    pub kill_switch_active_in_last_hour: bool,
}

pub struct StatusServer {
    state: Arc<AppState>,
    port: u16,
}

impl StatusServer {
    pub fn new(state: Arc<AppState>, port: u16) -> Self {
        Self { state, port }
    }

    pub fn router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/healthz", get(liveness_handler))
            .route("/status", get(status_handler))
            .route("/strategies/:id/close", post(close_handler))
            .with_state(state)
    }

    pub async fn run(&self) -> crate::Result<()> {
        let app = Self::router(Arc::clone(&self.state));
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting status server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .await
            .map_err(|e| FundarbError::Internal(format!("status server error: {}", e)))?;
        Ok(())
    }
}

async fn liveness_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let active_strategy_count = match state.store.active_strategies().await {
        Ok(strategies) => strategies.len(),
        Err(e) => {
            warn!("status query failed: {}", e);
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    let kill_switch_active_in_last_hour = match state.store.last_kill_event_at().await {
        Ok(Some(at)) => Utc::now() - at < Duration::hours(1),
        Ok(None) => false,
        Err(e) => {
            warn!("kill event query failed: {}", e);
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    let response = StatusResponse {
        status: "ok",
        uptime_seconds: (Utc::now() - state.started_at).num_seconds().max(0) as u64,
        active_strategy_count,
        last_analysis_time: *state.last_analysis.read().await,
        kill_switch_active_in_last_hour,
    };
    Json(response).into_response()
}

/// Manual close of one strategy through the coordinator's close path
async fn close_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.coordinator.close_strategy(id, None).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "closed": id }))).into_response(),
        Err(FundarbError::StrategyNotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "strategy not found" })),
        )
            .into_response(),
        Err(e) => {
            warn!("manual close of {} failed: {}", id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
