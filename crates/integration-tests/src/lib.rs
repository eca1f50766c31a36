//! Integration test support for PWA Commerce.
//!
//! [`MockRemote`] plays both the asset origin and the remote cart endpoint on
//! an ephemeral port. [`TestApp`] runs the storefront against it over an
//! in-memory store and serves it on another ephemeral port.
//!
//! # Test Categories
//!
//! - `cart_sync` - Local cart, operation log and cart synchronisation
//! - `service_worker` - Offline worker, catalog, push and the HTTP surface

#![allow(clippy::unwrap_used)]

use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::post,
};
use sqlx::SqlitePool;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

use pwa_commerce_core::{ConnectivityStatus, SyncOperation};
use pwa_commerce_storefront::config::{StorefrontConfig, SyncConfig};
use pwa_commerce_storefront::db::{self, OperationLog};
use pwa_commerce_storefront::state::AppState;

/// Catalog served by the mock origin.
pub const CATALOG: &str = r#"[
  {"product_id": 1, "name": "Brake Pad", "category": "Brakes", "price": "24.99",
   "original_price": "39.99", "discount": "38%", "photo_url": "/images/brake-pad.png"},
  {"product_id": 2, "name": "Oil Filter", "category": "Engine", "price": "9.99"},
  {"product_id": 3, "name": "Spark Plug", "category": "Engine", "price": "4.50"}
]"#;

/// How long a stalled delivery is held before the mock answers.
pub const STALL: Duration = Duration::from_secs(2);

// =============================================================================
// Mock origin and cart endpoint
// =============================================================================

#[derive(Default)]
struct MockState {
    received: Mutex<Vec<SyncOperation>>,
    rejected: Mutex<HashSet<String>>,
    stalled: Mutex<HashSet<String>>,
    missing: Mutex<HashSet<String>>,
    down: AtomicBool,
}

/// Asset origin and remote cart endpoint.
pub struct MockRemote {
    addr: SocketAddr,
    state: Arc<MockState>,
    task: JoinHandle<()>,
}

impl MockRemote {
    pub async fn spawn() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route("/api/cart/add", post(receive))
            .fallback(asset)
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state, task }
    }

    /// Origin URL, with trailing slash.
    #[must_use]
    pub fn origin(&self) -> Url {
        Url::parse(&format!("http://{}/", self.addr)).unwrap()
    }

    /// Operations acknowledged so far, in arrival order.
    #[must_use]
    pub fn received(&self) -> Vec<SyncOperation> {
        self.state.received.lock().unwrap().clone()
    }

    /// Product ids of the acknowledged operations, in arrival order.
    #[must_use]
    pub fn received_products(&self) -> Vec<String> {
        self.received()
            .iter()
            .map(|op| op.product_id.to_string())
            .collect()
    }

    /// Answer `500` for operations on `product_id`.
    pub fn reject(&self, product_id: &str) {
        self.state
            .rejected
            .lock()
            .unwrap()
            .insert(product_id.to_owned());
    }

    /// Hold operations on `product_id` for [`STALL`] before answering.
    pub fn stall(&self, product_id: &str) {
        self.state
            .stalled
            .lock()
            .unwrap()
            .insert(product_id.to_owned());
    }

    /// Accept every operation promptly again.
    pub fn accept_all(&self) {
        self.state.rejected.lock().unwrap().clear();
        self.state.stalled.lock().unwrap().clear();
    }

    /// Answer `404` for the asset at `path`.
    pub fn remove_asset(&self, path: &str) {
        self.state.missing.lock().unwrap().insert(path.to_owned());
    }

    /// Answer `503` for every asset.
    pub fn set_down(&self, down: bool) {
        self.state.down.store(down, Ordering::SeqCst);
    }
}

impl Drop for MockRemote {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn receive(
    State(state): State<Arc<MockState>>,
    Json(operation): Json<SyncOperation>,
) -> StatusCode {
    let product = operation.product_id.to_string();

    let rejected = state.rejected.lock().unwrap().contains(&product);
    if rejected {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }

    let stalled = state.stalled.lock().unwrap().contains(&product);
    if stalled {
        tokio::time::sleep(STALL).await;
    }

    state.received.lock().unwrap().push(operation);
    StatusCode::OK
}

async fn asset(State(state): State<Arc<MockState>>, uri: Uri) -> Response {
    if state.down.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "origin down").into_response();
    }

    let path = uri.path();
    let missing = state.missing.lock().unwrap().contains(path);
    if missing {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }

    let (content_type, body) = match path {
        "/" | "/index.html" => ("text/html", "<!doctype html><title>PWA Commerce</title>"),
        "/vite.svg" => ("image/svg+xml", r#"<svg xmlns="http://www.w3.org/2000/svg"/>"#),
        "/parts.json" => ("application/json", CATALOG),
        "/offline.html" => ("text/html", "<h1>You are offline</h1>"),
        "/about.html" => ("text/html", "<h1>About us</h1>"),
        _ => return (StatusCode::NOT_FOUND, "not found").into_response(),
    };

    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

// =============================================================================
// Storefront under test
// =============================================================================

/// How the storefront under test is started.
#[derive(Debug, Clone, Copy)]
pub struct TestOptions {
    pub initial_status: ConnectivityStatus,
    /// Install the worker and start the background tasks.
    pub start: bool,
    pub delivery_timeout: Duration,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            initial_status: ConnectivityStatus::Offline,
            start: true,
            delivery_timeout: Duration::from_secs(5),
        }
    }
}

/// A running storefront wired to a [`MockRemote`].
pub struct TestApp {
    pub state: AppState,
    pub remote: Arc<MockRemote>,
    pub client: reqwest::Client,
    addr: SocketAddr,
    server: JoinHandle<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(MockRemote::spawn().await, TestOptions::default()).await
    }

    pub async fn spawn_with(remote: MockRemote, options: TestOptions) -> Self {
        let pool = db::memory_pool().await.unwrap();
        db::migrate(&pool).await.unwrap();
        Self::spawn_on(Arc::new(remote), options, pool).await
    }

    /// Start a second storefront over this one's store and origin, as a
    /// process restart would.
    pub async fn restart(&self, options: TestOptions) -> Self {
        self.state.shutdown();
        Self::spawn_on(Arc::clone(&self.remote), options, self.state.pool().clone()).await
    }

    async fn spawn_on(remote: Arc<MockRemote>, options: TestOptions, pool: SqlitePool) -> Self {
        let origin = remote.origin();
        let config = StorefrontConfig {
            database_url: "sqlite::memory:".to_owned(),
            host: "127.0.0.1".parse().unwrap(),
            port: 0,
            base_url: Url::parse("http://127.0.0.1/").unwrap(),
            catalog_path: "parts.json".to_owned(),
            cache_name: "pwa-commerce-v1".to_owned(),
            sync: SyncConfig {
                endpoint_url: origin.join("api/cart/add").unwrap(),
                endpoint_token: None,
                delivery_timeout: options.delivery_timeout,
                probe_interval: None,
                initial_status: options.initial_status,
            },
            origin_url: origin,
            vapid_public_key: None,
            sentry_dsn: None,
            sentry_environment: None,
        };

        let state = AppState::new(config, pool).unwrap();

        let tasks = if options.start {
            state.start().await
        } else {
            Vec::new()
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = pwa_commerce_storefront::app(state.clone());
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            state,
            remote,
            client: reqwest::Client::new(),
            addr,
            server,
            tasks,
        }
    }

    /// Absolute URL of `path` on the storefront.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    pub async fn add_to_cart(&self, product_id: &str, quantity: u32) -> reqwest::Response {
        self.client
            .post(self.url("/api/cart/add"))
            .json(&serde_json::json!({ "product_id": product_id, "quantity": quantity }))
            .send()
            .await
            .unwrap()
    }

    pub async fn set_online(&self, online: bool) -> serde_json::Value {
        self.client
            .post(self.url("/api/connectivity"))
            .json(&serde_json::json!({ "online": online }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    /// Pending operations, read straight from the store.
    pub async fn pending(&self) -> Vec<SyncOperation> {
        OperationLog::new(self.state.pool())
            .list_pending()
            .await
            .unwrap()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.state.shutdown();
        self.server.abort();
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Poll `check` until it holds, for up to five seconds.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
