//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::task::JoinHandle;

use crate::config::StorefrontConfig;
use crate::events::EventBus;
use crate::services::{CartService, CatalogService};
use crate::sync::{ConnectivityMonitor, FlushScheduler, FlushWorker, HttpEndpoint, SyncRegistry};
use crate::worker::{CacheStorage, HttpNetwork, ServiceWorker, WorkerConfig};

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("invalid catalog url: {0}")]
    InvalidCatalogUrl(#[from] url::ParseError),
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the local store, the offline worker and the sync
/// machinery.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: SqlitePool,
    http: reqwest::Client,
    bus: EventBus,
    monitor: ConnectivityMonitor,
    flush: FlushWorker,
    scheduler: FlushScheduler,
    worker: ServiceWorker,
    catalog: CatalogService,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Nothing runs until [`AppState::start`] is called.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: StorefrontConfig, pool: SqlitePool) -> Result<Self, StateError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("pwa-commerce/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let bus = EventBus::new();
        let monitor = ConnectivityMonitor::new(config.sync.initial_status);

        let endpoint = HttpEndpoint::new(
            http.clone(),
            config.sync.endpoint_url.clone(),
            config.sync.endpoint_token.clone(),
        );
        let flush = FlushWorker::new(
            pool.clone(),
            endpoint,
            bus.clone(),
            config.sync.delivery_timeout,
        );
        let scheduler = FlushScheduler::new(SyncRegistry::new(), flush.clone());

        let worker = ServiceWorker::new(
            WorkerConfig {
                origin: config.origin_url.clone(),
                cache_name: config.cache_name.clone(),
                catalog_path: config.catalog_path.clone(),
            },
            HttpNetwork::new(http.clone()),
            CacheStorage::new(pool.clone()),
            flush.clone(),
            bus.clone(),
        );
        let catalog = CatalogService::new(worker.clone(), config.catalog_url()?, &config.base_url);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                http,
                bus,
                monitor,
                flush,
                scheduler,
                worker,
                catalog,
            }),
        })
    }

    /// Install and activate the offline worker, then start the background
    /// tasks: the sync listener, the connectivity trigger loop and, when
    /// configured, the connectivity probe.
    ///
    /// A failed install is logged; the worker then passes every request
    /// straight to the network.
    pub async fn start(&self) -> Vec<JoinHandle<()>> {
        if let Err(e) = self.inner.worker.start().await {
            tracing::error!(error = %e, "offline worker failed to start");
        }

        let events = self.inner.scheduler.registry().attach();
        let mut tasks = vec![
            self.inner.worker.spawn_sync_listener(events),
            self.inner
                .scheduler
                .spawn_trigger_loop(self.inner.monitor.subscribe(), self.inner.bus.clone()),
        ];

        if let Some(interval) = self.inner.config.sync.probe_interval {
            tasks.push(self.inner.monitor.spawn_probe(
                self.inner.http.clone(),
                self.inner.config.origin_url.clone(),
                interval,
            ));
        }

        tracing::info!(tasks = tasks.len(), "background tasks started");
        tasks
    }

    /// Stop the background tasks started by [`AppState::start`].
    pub fn shutdown(&self) {
        self.inner.scheduler.registry().detach();
        self.inner.monitor.shutdown();
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }

    /// Cart service bound to the local store.
    #[must_use]
    pub fn cart(&self) -> CartService<'_> {
        CartService::new(&self.inner.pool)
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    #[must_use]
    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.inner.monitor
    }

    #[must_use]
    pub fn flush(&self) -> &FlushWorker {
        &self.inner.flush
    }

    #[must_use]
    pub fn scheduler(&self) -> &FlushScheduler {
        &self.inner.scheduler
    }

    #[must_use]
    pub fn worker(&self) -> &ServiceWorker {
        &self.inner.worker
    }
}
