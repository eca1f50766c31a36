//! The offline worker.
//!
//! Everything the browser would hand to a service worker arrives here as a
//! [`WorkerEvent`] and is answered by [`ServiceWorker::handle`]:
//!
//! - `Install` pre-caches the static assets, all or nothing
//! - `Activate` drops caches from older versions, keeping the catalog copy
//! - `Fetch` answers a request from network and cache
//! - `Sync` runs the cart flush for the `sync-cart` tag
//! - `Push` shows a notification built from the push payload
//! - `NotificationClick` focuses or opens a page
//!
//! # Fetch strategies
//!
//! Cross-origin and non-`GET` requests go straight to the network. The
//! catalog is stale-while-revalidate. Everything else is network-first with
//! the cache, then the offline page, as fallback.

pub mod cache;
pub mod fetch;
pub mod push;

use std::sync::{Arc, RwLock};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::instrument;
use url::Url;

use pwa_commerce_core::WorkerState;

use crate::db::PersistenceError;
use crate::events::{ClientMessage, EventBus};
use crate::services::catalog::CATALOG_CACHE;
use crate::sync::{
    FlushReport, FlushWorker, HttpEndpoint, Notification, Notifier, RemoteEndpoint, SYNC_TAG,
    SyncEvents,
};

pub use cache::{Cache, CacheError, CacheStorage, CacheWrite};
pub use fetch::{
    FetchRequest, FetchResponse, HttpNetwork, Network, NetworkError, ResponseSource,
};
pub use push::{ClientAction, PushOptions};

/// Assets cached at install, relative to the origin.
pub const PRECACHE_ASSETS: &[&str] = &["", "index.html", "vite.svg", "parts.json"];

/// Page served for navigations when both network and cache fail.
pub const OFFLINE_PAGE: &str = "offline.html";

/// Errors that can occur while installing.
#[derive(Debug, Error)]
pub enum InstallError {
    /// An asset path does not form a valid URL.
    #[error("invalid asset url {path}: {source}")]
    InvalidUrl {
        path: String,
        source: url::ParseError,
    },

    /// An asset could not be fetched.
    #[error("failed to fetch {url}: {source}")]
    Fetch { url: String, source: NetworkError },

    /// An asset answered with a non-success status.
    #[error("failed to fetch {url}: status {status}")]
    Status { url: String, status: u16 },

    /// The fetched assets could not be stored.
    #[error("failed to store assets: {0}")]
    Cache(#[from] CacheError),
}

/// Errors that can occur handling a worker event.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("install failed: {0}")]
    Install(#[from] InstallError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("cannot move from {from} to {to}")]
    InvalidTransition { from: WorkerState, to: WorkerState },
}

/// Events the worker reacts to.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(FetchRequest),
    Sync { tag: String },
    Push { payload: Option<String> },
    NotificationClick { notification: Notification },
}

/// A fetch answer plus the cache update it started, if any.
#[derive(Debug)]
pub struct FetchOutcome {
    pub response: FetchResponse,
    pub cache_write: Option<CacheWrite>,
}

impl FetchOutcome {
    const fn respond(response: FetchResponse) -> Self {
        Self {
            response,
            cache_write: None,
        }
    }

    /// Return the response, letting any cache update finish on its own.
    #[must_use]
    pub fn detach(self) -> FetchResponse {
        if let Some(write) = self.cache_write {
            write.detach();
        }
        self.response
    }

    /// Return the response once any cache update has finished.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the cache update failed.
    pub async fn settle(self) -> Result<FetchResponse, CacheError> {
        if let Some(write) = self.cache_write {
            write.wait().await?;
        }
        Ok(self.response)
    }
}

/// Result of handling one event.
#[derive(Debug)]
pub enum WorkerOutcome {
    /// `reused` is set when the network was unreachable and a complete copy
    /// from an earlier install is kept instead.
    Installed { cached: usize, reused: bool },
    Activated { deleted: Vec<String> },
    Fetched(FetchOutcome),
    /// `None` when the tag is not one the worker handles.
    Synced(Option<FlushReport>),
    Notified { notification: Notification, shown: bool },
    Clicked(ClientAction),
}

/// Settings for the worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Origin of the proxied site. Only requests to this origin are cached.
    pub origin: Url,
    /// Name of the current cache version.
    pub cache_name: String,
    /// Path of the catalog file at the origin.
    pub catalog_path: String,
}

/// The offline worker. Cheap to clone.
pub struct ServiceWorker<N = HttpNetwork, E = HttpEndpoint> {
    inner: Arc<WorkerInner<N, E>>,
}

struct WorkerInner<N, E> {
    config: WorkerConfig,
    network: N,
    caches: CacheStorage,
    flush: FlushWorker<E>,
    notifier: Notifier,
    bus: EventBus,
    state: RwLock<WorkerState>,
}

impl<N, E> Clone for ServiceWorker<N, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<N: Network, E: RemoteEndpoint> ServiceWorker<N, E> {
    /// Create a worker in the `Parsed` state.
    #[must_use]
    pub fn new(
        config: WorkerConfig,
        network: N,
        caches: CacheStorage,
        flush: FlushWorker<E>,
        bus: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                config,
                network,
                caches,
                flush,
                notifier: Notifier::new(bus.clone()),
                bus,
                state: RwLock::new(WorkerState::Parsed),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn caches(&self) -> &CacheStorage {
        &self.inner.caches
    }

    #[must_use]
    pub fn network(&self) -> &N {
        &self.inner.network
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.inner
            .state
            .read()
            .map(|guard| *guard)
            .unwrap_or(WorkerState::Redundant)
    }

    /// Handle one event.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError` if the event is not valid in the current state
    /// or its handler fails. Fetches never fail on the worker's own
    /// strategies; only pass-through requests surface network errors.
    pub async fn handle(&self, event: WorkerEvent) -> Result<WorkerOutcome, WorkerError> {
        match event {
            WorkerEvent::Install => self.install().await,
            WorkerEvent::Activate => self.activate().await,
            WorkerEvent::Fetch(request) => self.fetch(request).await.map(WorkerOutcome::Fetched),
            WorkerEvent::Sync { tag } => self.sync(&tag).await,
            WorkerEvent::Push { payload } => Ok(self.push(payload.as_deref())),
            WorkerEvent::NotificationClick { notification } => {
                Ok(self.notification_click(&notification))
            }
        }
    }

    /// Install then activate. An install failure with no earlier copy to
    /// fall back on leaves the worker `Redundant` and is returned.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError` from the failing step.
    pub async fn start(&self) -> Result<(), WorkerError> {
        self.handle(WorkerEvent::Install).await?;
        self.handle(WorkerEvent::Activate).await?;
        Ok(())
    }

    /// Dispatch background-sync registrations as `Sync` events until the
    /// registry detaches.
    #[must_use]
    pub fn spawn_sync_listener(&self, mut events: SyncEvents) -> JoinHandle<()> {
        let worker = self.clone();
        tokio::spawn(async move {
            while let Some(tag) = events.next().await {
                if let Err(e) = worker.handle(WorkerEvent::Sync { tag }).await {
                    tracing::error!(error = %e, "sync event failed");
                }
            }
            tracing::debug!("sync listener stopped");
        })
    }

    fn transition(&self, next: WorkerState) -> Result<(), WorkerError> {
        let Ok(mut state) = self.inner.state.write() else {
            return Err(WorkerError::InvalidTransition {
                from: WorkerState::Redundant,
                to: next,
            });
        };
        if !state.can_transition_to(next) {
            return Err(WorkerError::InvalidTransition {
                from: *state,
                to: next,
            });
        }
        let from = *state;
        *state = next;
        tracing::debug!(%from, to = %next, "worker state changed");
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    #[instrument(skip(self), fields(cache = %self.inner.config.cache_name))]
    async fn install(&self) -> Result<WorkerOutcome, WorkerError> {
        self.transition(WorkerState::Installing)?;

        match self.precache().await {
            Ok(cached) => {
                self.transition(WorkerState::Installed)?;
                tracing::info!(cached, "worker installed");
                Ok(WorkerOutcome::Installed {
                    cached,
                    reused: false,
                })
            }
            Err(e) if self.has_precached_copy().await => {
                self.transition(WorkerState::Installed)?;
                tracing::warn!(error = %e, "precache failed, keeping existing cache");
                Ok(WorkerOutcome::Installed {
                    cached: PRECACHE_ASSETS.len(),
                    reused: true,
                })
            }
            Err(e) => {
                self.transition(WorkerState::Redundant)?;
                tracing::error!(error = %e, "worker install failed");
                Err(e.into())
            }
        }
    }

    /// Whether the current cache already holds every precached asset.
    async fn has_precached_copy(&self) -> bool {
        let name = &self.inner.config.cache_name;
        if !matches!(self.inner.caches.has(name).await, Ok(true)) {
            return false;
        }
        let Some(cache) = self.current_cache().await else {
            return false;
        };

        for path in PRECACHE_ASSETS {
            let Ok(url) = self.inner.config.origin.join(path) else {
                return false;
            };
            let key = FetchRequest::get(url).cache_key();
            if !matches!(cache.match_url(&key).await, Ok(Some(_))) {
                return false;
            }
        }
        true
    }

    async fn precache(&self) -> Result<usize, InstallError> {
        let mut entries = Vec::with_capacity(PRECACHE_ASSETS.len());

        for path in PRECACHE_ASSETS {
            let url = self
                .inner
                .config
                .origin
                .join(path)
                .map_err(|source| InstallError::InvalidUrl {
                    path: (*path).to_owned(),
                    source,
                })?;
            let request = FetchRequest::get(url);
            let key = request.cache_key();

            let response = self
                .inner
                .network
                .fetch(&request)
                .await
                .map_err(|source| InstallError::Fetch {
                    url: key.clone(),
                    source,
                })?;
            if !response.is_success() {
                return Err(InstallError::Status {
                    url: key,
                    status: response.status.as_u16(),
                });
            }
            entries.push((key, response));
        }

        let cache = self.inner.caches.open(&self.inner.config.cache_name).await?;
        cache.add_all(&entries).await?;
        Ok(entries.len())
    }

    #[instrument(skip(self))]
    async fn activate(&self) -> Result<WorkerOutcome, WorkerError> {
        self.transition(WorkerState::Activating)?;

        let mut deleted = Vec::new();
        for name in self.inner.caches.keys().await? {
            if name == self.inner.config.cache_name || name == CATALOG_CACHE {
                continue;
            }
            if self.inner.caches.delete(&name).await? {
                tracing::info!(cache = %name, "stale cache deleted");
                deleted.push(name);
            }
        }

        self.transition(WorkerState::Activated)?;
        tracing::info!(clients = self.inner.bus.client_count(), "worker activated, clients claimed");
        Ok(WorkerOutcome::Activated { deleted })
    }

    // =========================================================================
    // Fetch
    // =========================================================================

    fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.inner.config.origin.origin()
    }

    fn is_catalog(&self, url: &Url) -> bool {
        url.path().ends_with(self.inner.config.catalog_path.as_str())
    }

    /// Answer a request.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Network` only for pass-through requests.
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchOutcome, WorkerError> {
        if !self.state().is_active()
            || request.method != axum::http::Method::GET
            || !self.is_same_origin(&request.url)
        {
            let response = self.inner.network.fetch(&request).await?;
            return Ok(FetchOutcome::respond(response));
        }

        if self.is_catalog(&request.url) {
            Ok(self.stale_while_revalidate(request).await)
        } else {
            Ok(self.network_first(request).await)
        }
    }

    async fn current_cache(&self) -> Option<Cache> {
        match self.inner.caches.open(&self.inner.config.cache_name).await {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!(error = %e, "cache unavailable");
                None
            }
        }
    }

    async fn stale_while_revalidate(&self, request: FetchRequest) -> FetchOutcome {
        let key = request.cache_key();
        let Some(cache) = self.current_cache().await else {
            return self.network_only(&request).await;
        };

        let cached = cache.match_url(&key).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "cache lookup failed");
            None
        });

        if let Some(cached) = cached {
            let worker = self.clone();
            let revalidate = CacheWrite::spawn(key.clone(), async move {
                match worker.inner.network.fetch(&request).await {
                    Ok(fresh) if fresh.is_success() => cache.put(&key, &fresh).await,
                    Ok(fresh) => {
                        tracing::debug!(status = %fresh.status, "revalidation skipped");
                        Ok(())
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "revalidation failed");
                        Ok(())
                    }
                }
            });
            return FetchOutcome {
                response: cached,
                cache_write: Some(revalidate),
            };
        }

        match self.inner.network.fetch(&request).await {
            Ok(response) if response.is_success() => FetchOutcome {
                cache_write: Some(cache.put_in_background(key, response.clone())),
                response,
            },
            Ok(response) => FetchOutcome::respond(response),
            Err(e) => {
                tracing::debug!(error = %e, "catalog unavailable");
                FetchOutcome::respond(self.offline_fallback(&key, false).await)
            }
        }
    }

    async fn network_first(&self, request: FetchRequest) -> FetchOutcome {
        let key = request.cache_key();

        match self.inner.network.fetch(&request).await {
            Ok(response) if response.is_success() => {
                let cache_write = self
                    .current_cache()
                    .await
                    .map(|cache| cache.put_in_background(key, response.clone()));
                FetchOutcome {
                    response,
                    cache_write,
                }
            }
            Ok(response) => match self.lookup(&key).await {
                Some(cached) => FetchOutcome::respond(cached),
                None => FetchOutcome::respond(response),
            },
            Err(e) => {
                tracing::debug!(error = %e, "network failed, using cache");
                FetchOutcome::respond(self.offline_fallback(&key, true).await)
            }
        }
    }

    async fn network_only(&self, request: &FetchRequest) -> FetchOutcome {
        match self.inner.network.fetch(request).await {
            Ok(response) => FetchOutcome::respond(response),
            Err(e) => {
                tracing::debug!(error = %e, "network failed");
                FetchOutcome::respond(FetchResponse::offline())
            }
        }
    }

    async fn lookup(&self, key: &str) -> Option<FetchResponse> {
        self.inner.caches.match_any(key).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "cache lookup failed");
            None
        })
    }

    /// Cached copy, else the cached offline page, else a synthetic `503`.
    async fn offline_fallback(&self, key: &str, any_cache: bool) -> FetchResponse {
        let cached = if any_cache {
            self.lookup(key).await
        } else {
            match self.current_cache().await {
                Some(cache) => cache.match_url(key).await.ok().flatten(),
                None => None,
            }
        };
        if let Some(cached) = cached {
            return cached;
        }

        if let Ok(offline_url) = self.inner.config.origin.join(OFFLINE_PAGE)
            && let Some(page) = self.lookup(offline_url.as_str()).await
        {
            return page;
        }

        FetchResponse::offline()
    }

    // =========================================================================
    // Sync, push, notification click
    // =========================================================================

    #[instrument(skip(self))]
    async fn sync(&self, tag: &str) -> Result<WorkerOutcome, WorkerError> {
        if tag != SYNC_TAG {
            tracing::debug!("unknown sync tag ignored");
            return Ok(WorkerOutcome::Synced(None));
        }

        let report = self.inner.flush.run().await?;
        Ok(WorkerOutcome::Synced(Some(report)))
    }

    fn push(&self, payload: Option<&str>) -> WorkerOutcome {
        let notification = push::notification_from_push(payload, &self.inner.config.origin);

        let shown = match self.inner.notifier.show(notification.clone()) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "push notification not shown");
                false
            }
        };

        WorkerOutcome::Notified {
            notification,
            shown,
        }
    }

    fn notification_click(&self, notification: &Notification) -> WorkerOutcome {
        let url = notification
            .data
            .url
            .clone()
            .unwrap_or_else(|| self.inner.config.origin.origin().ascii_serialization());

        let action = ClientAction::for_click(&url, &self.inner.bus.clients());
        if let ClientAction::Focus { client_id } = &action {
            self.inner.bus.publish(ClientMessage::Focus {
                client_id: *client_id,
            });
        }

        tracing::debug!(?action, %url, "notification clicked");
        WorkerOutcome::Clicked(action)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use axum::body::Bytes;
    use axum::http::{Method, StatusCode};

    use super::*;
    use sqlx::SqlitePool;

    use crate::db::test_pool;
    use crate::sync::flush::tests::ScriptedEndpoint;

    pub(crate) const ORIGIN: &str = "http://origin.test/";

    /// In-memory origin that can be switched offline.
    #[derive(Default)]
    pub(crate) struct FakeNetwork {
        pub routes: Mutex<HashMap<String, (StatusCode, &'static str)>>,
        pub offline: AtomicBool,
    }

    impl FakeNetwork {
        pub fn site() -> Self {
            let network = Self::default();
            for path in ["", "index.html", "vite.svg"] {
                network.serve(path, StatusCode::OK, "asset");
            }
            network.serve("parts.json", StatusCode::OK, r#"[{"product_id": 1, "name": "Bolt", "price": "1.50"}]"#);
            network
        }

        pub fn serve(&self, path: &str, status: StatusCode, body: &'static str) {
            self.routes
                .lock()
                .unwrap()
                .insert(format!("{ORIGIN}{path}"), (status, body));
        }

        pub fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }
    }

    impl Network for FakeNetwork {
        async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(NetworkError::Unavailable);
            }
            let (status, body) = self
                .routes
                .lock()
                .unwrap()
                .get(request.url.as_str())
                .copied()
                .unwrap_or((StatusCode::NOT_FOUND, "not found"));
            Ok(FetchResponse {
                status,
                content_type: None,
                body: Bytes::from_static(body.as_bytes()),
                source: ResponseSource::Network,
            })
        }
    }

    pub(crate) async fn worker_with(
        network: FakeNetwork,
    ) -> ServiceWorker<FakeNetwork, ScriptedEndpoint> {
        worker_on(test_pool().await, network)
    }

    /// A worker over an existing store, as after a restart.
    fn worker_on(
        pool: SqlitePool,
        network: FakeNetwork,
    ) -> ServiceWorker<FakeNetwork, ScriptedEndpoint> {
        let bus = EventBus::new();
        let flush = FlushWorker::new(
            pool.clone(),
            ScriptedEndpoint::default(),
            bus.clone(),
            Duration::from_secs(5),
        );
        ServiceWorker::new(
            WorkerConfig {
                origin: Url::parse(ORIGIN).unwrap(),
                cache_name: "pwa-commerce-v1".to_owned(),
                catalog_path: "parts.json".to_owned(),
            },
            network,
            CacheStorage::new(pool),
            flush,
            bus,
        )
    }

    fn get(path: &str) -> FetchRequest {
        FetchRequest::get(Url::parse(ORIGIN).unwrap().join(path).unwrap())
    }

    async fn fetch_settled(
        worker: &ServiceWorker<FakeNetwork, ScriptedEndpoint>,
        request: FetchRequest,
    ) -> FetchResponse {
        let Ok(WorkerOutcome::Fetched(outcome)) = worker.handle(WorkerEvent::Fetch(request)).await
        else {
            panic!("expected a fetch outcome");
        };
        outcome.settle().await.unwrap()
    }

    #[tokio::test]
    async fn test_install_and_activate() {
        let worker = worker_with(FakeNetwork::site()).await;
        worker.caches().open("pwa-commerce-v0").await.unwrap();

        let installed = worker.handle(WorkerEvent::Install).await.unwrap();
        assert!(matches!(
            installed,
            WorkerOutcome::Installed {
                cached: 4,
                reused: false
            }
        ));
        assert_eq!(worker.state(), WorkerState::Installed);

        let activated = worker.handle(WorkerEvent::Activate).await.unwrap();
        let WorkerOutcome::Activated { deleted } = activated else {
            panic!("expected activation");
        };
        assert_eq!(deleted, ["pwa-commerce-v0"]);
        assert_eq!(worker.caches().keys().await.unwrap(), ["pwa-commerce-v1"]);
        assert_eq!(worker.state(), WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let network = FakeNetwork::site();
        network.serve("vite.svg", StatusCode::NOT_FOUND, "missing");
        let worker = worker_with(network).await;

        let err = worker.handle(WorkerEvent::Install).await.unwrap_err();
        assert!(matches!(
            err,
            WorkerError::Install(InstallError::Status { status: 404, .. })
        ));
        assert_eq!(worker.state(), WorkerState::Redundant);
        assert!(worker.caches().match_any(ORIGIN).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restart_offline_keeps_existing_cache() {
        let pool = test_pool().await;
        let first = worker_on(pool.clone(), FakeNetwork::site());
        first.start().await.unwrap();

        let network = FakeNetwork::site();
        network.set_offline(true);
        let restarted = worker_on(pool, network);

        let installed = restarted.handle(WorkerEvent::Install).await.unwrap();
        assert!(matches!(
            installed,
            WorkerOutcome::Installed { reused: true, .. }
        ));
        restarted.handle(WorkerEvent::Activate).await.unwrap();
        assert_eq!(restarted.state(), WorkerState::Activated);

        let response = fetch_settled(&restarted, get("index.html")).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_offline_install_with_partial_cache_is_redundant() {
        let pool = test_pool().await;
        let network = FakeNetwork::site();
        network.set_offline(true);
        let worker = worker_on(pool, network);
        let partial = worker.caches().open("pwa-commerce-v1").await.unwrap();
        partial
            .put(&get("index.html").cache_key(), &FetchResponse::offline())
            .await
            .unwrap();

        assert!(worker.start().await.is_err());
        assert_eq!(worker.state(), WorkerState::Redundant);
    }

    #[tokio::test]
    async fn test_activate_keeps_catalog_copy() {
        let pool = test_pool().await;
        let worker = worker_on(pool.clone(), FakeNetwork::site());
        let copy = worker.caches().open(CATALOG_CACHE).await.unwrap();
        copy.put(
            "http://storefront.test/products",
            &FetchResponse::json_bytes(b"[]".to_vec()),
        )
            .await
            .unwrap();
        worker.caches().open("pwa-commerce-v0").await.unwrap();
        worker.start().await.unwrap();

        // Survives a second activation over the same store too
        let restarted = worker_on(pool, FakeNetwork::site());
        restarted.start().await.unwrap();

        let mut names = restarted.caches().keys().await.unwrap();
        names.sort();
        assert_eq!(names, [CATALOG_CACHE, "pwa-commerce-v1"]);
        assert!(
            restarted
                .caches()
                .match_any("http://storefront.test/products")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_activate_requires_install() {
        let worker = worker_with(FakeNetwork::site()).await;
        let err = worker.handle(WorkerEvent::Activate).await.unwrap_err();
        assert!(matches!(err, WorkerError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_network_first_caches_and_falls_back() {
        let worker = worker_with(FakeNetwork::site()).await;
        worker.start().await.unwrap();
        worker.network().serve("about", StatusCode::OK, "about us");

        let online = fetch_settled(&worker, get("about")).await;
        assert_eq!(online.source, ResponseSource::Network);

        worker.network().set_offline(true);
        let offline = fetch_settled(&worker, get("about")).await;
        assert_eq!(offline.source, ResponseSource::Cache);
        assert_eq!(offline.body, Bytes::from_static(b"about us"));
    }

    #[tokio::test]
    async fn test_network_first_error_status_prefers_cache() {
        let worker = worker_with(FakeNetwork::site()).await;
        worker.start().await.unwrap();

        worker.network().serve("index.html", StatusCode::INTERNAL_SERVER_ERROR, "boom");
        let response = fetch_settled(&worker, get("index.html")).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.source, ResponseSource::Cache);

        worker.network().serve("missing", StatusCode::NOT_FOUND, "nope");
        let response = fetch_settled(&worker, get("missing")).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.source, ResponseSource::Network);
    }

    #[tokio::test]
    async fn test_offline_page_then_synthetic_503() {
        let worker = worker_with(FakeNetwork::site()).await;
        worker.start().await.unwrap();
        worker.network().set_offline(true);

        let response = fetch_settled(&worker, get("never-seen")).await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.source, ResponseSource::Synthetic);

        worker.network().set_offline(false);
        worker.network().serve(OFFLINE_PAGE, StatusCode::OK, "you are offline");
        fetch_settled(&worker, get(OFFLINE_PAGE)).await;
        worker.network().set_offline(true);

        let response = fetch_settled(&worker, get("never-seen")).await;
        assert_eq!(response.body, Bytes::from_static(b"you are offline"));
    }

    #[tokio::test]
    async fn test_catalog_stale_while_revalidate() {
        let worker = worker_with(FakeNetwork::site()).await;
        worker.start().await.unwrap();

        worker.network().serve("parts.json", StatusCode::OK, "[]");
        let stale = fetch_settled(&worker, get("parts.json")).await;
        assert_eq!(stale.source, ResponseSource::Cache);
        assert_ne!(stale.body, Bytes::from_static(b"[]"));

        let fresh = fetch_settled(&worker, get("parts.json")).await;
        assert_eq!(fresh.body, Bytes::from_static(b"[]"));

        worker.network().set_offline(true);
        let offline = fetch_settled(&worker, get("parts.json")).await;
        assert_eq!(offline.body, Bytes::from_static(b"[]"));
    }

    #[tokio::test]
    async fn test_passthrough_requests_are_not_cached() {
        let worker = worker_with(FakeNetwork::site()).await;
        worker.start().await.unwrap();

        let mut post = get("api/cart/add");
        post.method = Method::POST;
        let Ok(WorkerOutcome::Fetched(outcome)) = worker.handle(WorkerEvent::Fetch(post)).await
        else {
            panic!("expected a fetch outcome");
        };
        assert!(outcome.cache_write.is_none());

        let foreign = FetchRequest::get(Url::parse("http://elsewhere.test/x").unwrap());
        let Ok(WorkerOutcome::Fetched(outcome)) = worker.handle(WorkerEvent::Fetch(foreign)).await
        else {
            panic!("expected a fetch outcome");
        };
        assert!(outcome.cache_write.is_none());
        assert!(
            worker
                .caches()
                .match_any("http://elsewhere.test/x")
                .await
                .unwrap()
                .is_none()
        );

        worker.network().set_offline(true);
        let mut post = get("api/cart/add");
        post.method = Method::POST;
        let result = worker.handle(WorkerEvent::Fetch(post)).await;
        assert!(matches!(result, Err(WorkerError::Network(_))));
    }

    #[tokio::test]
    async fn test_unknown_sync_tag_ignored() {
        let worker = worker_with(FakeNetwork::site()).await;
        let outcome = worker
            .handle(WorkerEvent::Sync {
                tag: "other".to_owned(),
            })
            .await
            .unwrap();
        assert!(matches!(outcome, WorkerOutcome::Synced(None)));

        let outcome = worker
            .handle(WorkerEvent::Sync {
                tag: SYNC_TAG.to_owned(),
            })
            .await
            .unwrap();
        assert!(matches!(outcome, WorkerOutcome::Synced(Some(_))));
    }

    #[tokio::test]
    async fn test_push_and_click() {
        let worker = worker_with(FakeNetwork::site()).await;

        let outcome = worker.handle(WorkerEvent::Push { payload: None }).await.unwrap();
        let WorkerOutcome::Notified {
            notification,
            shown,
        } = outcome
        else {
            panic!("expected a notification");
        };
        assert!(!shown);
        assert_eq!(notification.data.url.as_deref(), Some("http://origin.test"));

        let outcome = worker
            .handle(WorkerEvent::NotificationClick {
                notification: notification.clone(),
            })
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            WorkerOutcome::Clicked(ClientAction::OpenWindow { .. })
        ));

        let client = worker.inner.bus.connect("http://origin.test");
        let outcome = worker
            .handle(WorkerEvent::NotificationClick { notification })
            .await
            .unwrap();
        let WorkerOutcome::Clicked(ClientAction::Focus { client_id }) = outcome else {
            panic!("expected focus");
        };
        assert_eq!(client_id, client.id());
    }
}
