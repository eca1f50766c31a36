//! Offline-aware proxy to the asset origin.
//!
//! Requests no other route claims are answered by the offline worker, which
//! decides between network and cache.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, Method, Uri, header},
    response::{IntoResponse, Response},
};
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::worker::{FetchRequest, ResponseSource};

/// Response header naming where the body came from.
pub const SOURCE_HEADER: &str = "x-served-from";

/// Forward a request through the offline worker.
#[instrument(skip(state, headers, body), fields(%method, %uri))]
pub async fn fetch(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let target = uri
        .path_and_query()
        .map_or("", |pq| pq.as_str())
        .trim_start_matches('/');
    let url = state
        .config()
        .origin_url
        .join(target)
        .map_err(|e| AppError::BadRequest(format!("invalid path: {e}")))?;

    let request = FetchRequest {
        method,
        url,
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
        body,
    };

    let response = state.worker().fetch(request).await?.detach();

    let source = match response.source {
        ResponseSource::Network => "network",
        ResponseSource::Cache => "cache",
        ResponseSource::Synthetic => "offline",
    };

    let mut out = (response.status, response.body).into_response();
    if let Some(content_type) = response
        .content_type
        .as_deref()
        .and_then(|v| HeaderValue::from_str(v).ok())
    {
        out.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    out.headers_mut()
        .insert(SOURCE_HEADER, HeaderValue::from_static(source));

    Ok(out)
}
