//! Delivery of operations to the remote cart endpoint.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

use pwa_commerce_core::SyncOperation;

/// Longest response body kept in a rejection error.
const MAX_ERROR_BODY: usize = 512;

/// Errors that can occur delivering one operation.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Endpoint unreachable or the connection failed.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status.
    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// No acknowledgment within the deadline.
    #[error("no acknowledgment within {0:?}")]
    Timeout(Duration),

    /// The operation could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The remote side of the sync protocol.
///
/// `deliver` resolves to `Ok(())` only once the endpoint has acknowledged the
/// operation. Endpoints must tolerate duplicates.
pub trait RemoteEndpoint: Send + Sync + 'static {
    fn deliver(
        &self,
        operation: &SyncOperation,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Endpoint reached over HTTP: one `POST` with the operation as JSON per
/// delivery, any 2xx is an acknowledgment.
#[derive(Clone)]
pub struct HttpEndpoint {
    client: reqwest::Client,
    url: Url,
    token: Option<SecretString>,
}

impl HttpEndpoint {
    /// Create an endpoint posting to `url`.
    #[must_use]
    pub const fn new(client: reqwest::Client, url: Url, token: Option<SecretString>) -> Self {
        Self { client, url, token }
    }

    /// The endpoint URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

impl std::fmt::Debug for HttpEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEndpoint")
            .field("url", &self.url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl RemoteEndpoint for HttpEndpoint {
    async fn deliver(&self, operation: &SyncOperation) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(operation)?;

        let mut request = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token.expose_secret()));
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut end = MAX_ERROR_BODY;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }

        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
