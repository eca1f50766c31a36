//! Push events, push subscription options and notification clicks.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::sync::Notification;
use crate::worker::push::notification_from_push;
use crate::worker::{ClientAction, PushOptions, WorkerEvent, WorkerOutcome};

#[derive(Debug, Serialize)]
pub struct PushResponse {
    pub notification: Notification,
    /// Whether any live page received it.
    pub shown: bool,
}

/// Notification click body.
#[derive(Debug, Default, Deserialize)]
pub struct ClickRequest {
    /// Page the notification points to; defaults to the origin.
    pub url: Option<String>,
}

/// Deliver a push message. The raw body is the push payload.
#[instrument(skip(state, body))]
pub async fn inject(State(state): State<AppState>, body: String) -> Result<Json<PushResponse>> {
    let payload = (!body.trim().is_empty()).then_some(body);

    match state.worker().handle(WorkerEvent::Push { payload }).await? {
        WorkerOutcome::Notified {
            notification,
            shown,
        } => Ok(Json(PushResponse {
            notification,
            shown,
        })),
        other => Err(AppError::Internal(format!(
            "unexpected push outcome: {other:?}"
        ))),
    }
}

/// Options a page needs to subscribe to push.
pub async fn options(State(state): State<AppState>) -> Result<Json<PushOptions>> {
    state
        .config()
        .vapid_public_key
        .as_deref()
        .map(|key| Json(PushOptions::new(key)))
        .ok_or_else(|| AppError::NotFound("push is not configured".to_string()))
}

/// Handle a click on a shown notification.
#[instrument(skip(state))]
pub async fn click(
    State(state): State<AppState>,
    Json(request): Json<ClickRequest>,
) -> Result<Json<ClientAction>> {
    let mut notification = notification_from_push(None, &state.config().origin_url);
    if request.url.is_some() {
        notification.data.url = request.url;
    }

    match state
        .worker()
        .handle(WorkerEvent::NotificationClick { notification })
        .await?
    {
        WorkerOutcome::Clicked(action) => Ok(Json(action)),
        other => Err(AppError::Internal(format!(
            "unexpected click outcome: {other:?}"
        ))),
    }
}
