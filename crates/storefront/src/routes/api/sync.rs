//! Sync queue and connectivity endpoints.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use pwa_commerce_core::{ConnectivityStatus, SyncOperation};

use crate::db::OperationLog;
use crate::error::Result;
use crate::state::AppState;
use crate::sync::FlushRequest;

/// Connectivity signal from the page.
#[derive(Debug, Deserialize)]
pub struct ConnectivityRequest {
    pub online: bool,
}

#[derive(Debug, Serialize)]
pub struct ConnectivityResponse {
    pub status: ConnectivityStatus,
    /// Whether the signal changed the recorded status.
    pub changed: bool,
}

/// Operations not yet confirmed by the remote endpoint, oldest first.
#[instrument(skip(state))]
pub async fn pending(State(state): State<AppState>) -> Result<Json<Vec<SyncOperation>>> {
    Ok(Json(OperationLog::new(state.pool()).list_pending().await?))
}

/// Register a background sync.
#[instrument(skip(state))]
pub async fn request_flush(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<FlushRequest>)> {
    let request = state.scheduler().request_flush().await?;
    Ok((StatusCode::ACCEPTED, Json(request)))
}

/// Current connectivity.
pub async fn connectivity(State(state): State<AppState>) -> Json<ConnectivityResponse> {
    Json(ConnectivityResponse {
        status: state.monitor().current(),
        changed: false,
    })
}

/// Record an online/offline signal.
#[instrument(skip(state))]
pub async fn report_connectivity(
    State(state): State<AppState>,
    Json(request): Json<ConnectivityRequest>,
) -> Json<ConnectivityResponse> {
    let status = ConnectivityStatus::from_online(request.online);
    let changed = state.monitor().report(status);
    Json(ConnectivityResponse {
        status: state.monitor().current(),
        changed,
    })
}
