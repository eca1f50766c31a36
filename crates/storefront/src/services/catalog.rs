//! Product catalog.
//!
//! The catalog file is fetched from the origin through the offline worker.
//! A successful load is kept for the session in memory and copied into the
//! `ecommerce-cache` cache, which is what the storefront falls back to when
//! the catalog cannot be fetched.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use pwa_commerce_core::{Product, ProductId};

use crate::sync::{HttpEndpoint, RemoteEndpoint};
use crate::worker::{
    CacheError, FetchRequest, FetchResponse, HttpNetwork, Network, ServiceWorker,
};

/// Cache holding the last catalog that loaded successfully.
pub const CATALOG_CACHE: &str = "ecommerce-cache";

/// Key of the catalog copy inside [`CATALOG_CACHE`], relative to the storefront.
pub const CATALOG_KEY: &str = "products";

/// How long a loaded catalog is reused before it is fetched again.
const SESSION_TTL: Duration = Duration::from_secs(300);

/// Errors that can occur loading the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Neither the origin nor the cache has a catalog.
    #[error("product catalog unavailable")]
    Unavailable,

    /// The catalog is not a valid product list.
    #[error("invalid catalog: {0}")]
    Decode(#[from] serde_json::Error),

    /// The cached copy could not be read or written.
    #[error("catalog cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Loads and caches the product list.
pub struct CatalogService<N = HttpNetwork, E = HttpEndpoint> {
    inner: Arc<CatalogInner<N, E>>,
}

struct CatalogInner<N, E> {
    worker: ServiceWorker<N, E>,
    catalog_url: Url,
    copy_key: String,
    session: Cache<String, Arc<Vec<Product>>>,
}

impl<N, E> Clone for CatalogService<N, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<N: Network, E: RemoteEndpoint> CatalogService<N, E> {
    /// Create a catalog service loading `catalog_url` and keeping its copy
    /// under `base_url`.
    #[must_use]
    pub fn new(worker: ServiceWorker<N, E>, catalog_url: Url, base_url: &Url) -> Self {
        let copy_key = base_url
            .join(CATALOG_KEY)
            .map_or_else(|_| format!("/{CATALOG_KEY}"), String::from);

        let session = Cache::builder()
            .max_capacity(4)
            .time_to_live(SESSION_TTL)
            .build();

        Self {
            inner: Arc::new(CatalogInner {
                worker,
                catalog_url,
                copy_key,
                session,
            }),
        }
    }

    /// All products.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Unavailable` if the catalog cannot be fetched
    /// and no copy is cached.
    #[instrument(skip(self), fields(url = %self.inner.catalog_url))]
    pub async fn products(&self) -> Result<Arc<Vec<Product>>, CatalogError> {
        let session_key = self.inner.catalog_url.to_string();
        if let Some(products) = self.inner.session.get(&session_key).await {
            tracing::debug!("Cache hit for catalog");
            return Ok(products);
        }

        match self.fetch().await {
            Ok(products) => {
                let products = Arc::new(products);
                self.store_copy(&products).await;
                self.inner
                    .session
                    .insert(session_key, Arc::clone(&products))
                    .await;
                Ok(products)
            }
            Err(e) => {
                tracing::warn!(error = %e, "catalog fetch failed, using cached copy");
                self.cached_copy().await
            }
        }
    }

    /// Look up one product.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the catalog cannot be loaded.
    pub async fn find(&self, product_id: &ProductId) -> Result<Option<Product>, CatalogError> {
        let products = self.products().await?;
        Ok(products.iter().find(|p| &p.product_id == product_id).cloned())
    }

    /// Forget the in-memory catalog so the next call fetches it again.
    pub async fn invalidate(&self) {
        self.inner.session.invalidate_all();
        self.inner.session.run_pending_tasks().await;
    }

    async fn fetch(&self) -> Result<Vec<Product>, CatalogError> {
        let request = FetchRequest::get(self.inner.catalog_url.clone());
        let response = match self.inner.worker.fetch(request).await {
            Ok(outcome) => outcome.detach(),
            Err(e) => {
                tracing::debug!(error = %e, "catalog request failed");
                return Err(CatalogError::Unavailable);
            }
        };

        if !response.is_success() {
            tracing::debug!(status = %response.status, "catalog request not successful");
            return Err(CatalogError::Unavailable);
        }
        Ok(response.json()?)
    }

    async fn store_copy(&self, products: &[Product]) {
        let result = async {
            let body = serde_json::to_vec(products)?;
            let cache = self.inner.worker.caches().open(CATALOG_CACHE).await?;
            cache
                .put(&self.inner.copy_key, &FetchResponse::json_bytes(body))
                .await?;
            Ok::<_, CatalogError>(())
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to cache catalog copy");
        }
    }

    async fn cached_copy(&self) -> Result<Arc<Vec<Product>>, CatalogError> {
        let cache = self.inner.worker.caches().open(CATALOG_CACHE).await?;
        let cached = cache
            .match_url(&self.inner.copy_key)
            .await?
            .ok_or(CatalogError::Unavailable)?;
        Ok(Arc::new(cached.json()?))
    }
}
