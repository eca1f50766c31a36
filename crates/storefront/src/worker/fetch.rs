//! Requests, responses and the network seam used by the offline worker.

use std::future::Future;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use chrono::Utc;
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::db::StoredResponse;

/// Errors that can occur reaching the network.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Connection failed, timed out or the body could not be read.
    #[error("network request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Network access is switched off.
    #[error("network unavailable")]
    Unavailable,
}

/// A request seen by the worker.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchRequest {
    /// A plain `GET`.
    #[must_use]
    pub const fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            content_type: None,
            body: Bytes::new(),
        }
    }

    /// The key this request is cached under: the URL without its fragment.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.into()
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    /// Built by the worker, e.g. the offline `503`.
    Synthetic,
}

/// A response produced by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl FetchResponse {
    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The response returned when neither network nor cache can answer.
    #[must_use]
    pub fn offline() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            content_type: Some("text/plain; charset=utf-8".to_owned()),
            body: Bytes::from_static(b"Offline"),
            source: ResponseSource::Synthetic,
        }
    }

    /// A `200` JSON response built from bytes already in hand.
    #[must_use]
    pub fn json_bytes(body: Vec<u8>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: Some("application/json".to_owned()),
            body: Bytes::from(body),
            source: ResponseSource::Synthetic,
        }
    }

    /// Parse the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Convert for storage under `url`.
    #[must_use]
    pub fn to_stored(&self, url: &str) -> StoredResponse {
        StoredResponse {
            url: url.to_owned(),
            status: self.status.as_u16(),
            content_type: self.content_type.clone(),
            body: self.body.to_vec(),
            stored_at: Utc::now(),
        }
    }
}

impl From<StoredResponse> for FetchResponse {
    fn from(stored: StoredResponse) -> Self {
        Self {
            status: StatusCode::from_u16(stored.status).unwrap_or(StatusCode::OK),
            content_type: stored.content_type,
            body: Bytes::from(stored.body),
            source: ResponseSource::Cache,
        }
    }
}

/// Network access for the worker.
pub trait Network: Send + Sync + 'static {
    fn fetch(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<FetchResponse, NetworkError>> + Send;
}

/// Network access over HTTP.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: reqwest::Client,
}

impl HttpNetwork {
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Network for HttpNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        if let Some(content_type) = &request.content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await?;

        Ok(FetchResponse {
            status,
            content_type,
            body,
            source: ResponseSource::Network,
        })
    }
}
