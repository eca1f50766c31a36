//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_ORIGIN_URL` - Origin serving the static assets and the catalog
//!
//! ## Optional
//! - `STOREFRONT_DATABASE_URL` - `SQLite` store (fallback `DATABASE_URL`, default: sqlite://pwa-commerce.db)
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront (default: http://127.0.0.1:3000)
//! - `STOREFRONT_CATALOG_PATH` - Catalog path at the origin (default: parts.json)
//! - `STOREFRONT_CACHE_NAME` - Current cache version (default: pwa-commerce-v1)
//! - `SYNC_ENDPOINT_URL` - Remote cart endpoint (default: {origin}/api/cart/add)
//! - `SYNC_ENDPOINT_TOKEN` - Bearer token for the remote cart endpoint
//! - `SYNC_DELIVERY_TIMEOUT_SECS` - Deadline for one delivery (default: 10)
//! - `SYNC_PROBE_INTERVAL_SECS` - Connectivity probe period, 0 disables (default: 0)
//! - `SYNC_START_ONLINE` - Initial connectivity reading (default: true)
//! - `VAPID_PUBLIC_KEY` - Push application server key, URL-safe base64
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use pwa_commerce_core::ConnectivityStatus;

use crate::worker::push::decode_application_server_key;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `SQLite` database URL
    pub database_url: String,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: Url,
    /// Origin of the static assets and catalog
    pub origin_url: Url,
    /// Catalog path at the origin
    pub catalog_path: String,
    /// Name of the current cache version
    pub cache_name: String,
    /// Cart synchronization settings
    pub sync: SyncConfig,
    /// Decoded push application server key
    pub vapid_public_key: Option<Vec<u8>>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Cart synchronization settings.
///
/// Implements `Debug` manually to redact the endpoint token.
#[derive(Clone)]
pub struct SyncConfig {
    /// Remote cart endpoint
    pub endpoint_url: Url,
    /// Bearer token sent to the endpoint
    pub endpoint_token: Option<SecretString>,
    /// Deadline for one delivery attempt
    pub delivery_timeout: Duration,
    /// Connectivity probe period, `None` when probing is off
    pub probe_interval: Option<Duration>,
    /// Connectivity assumed at startup
    pub initial_status: ConnectivityStatus,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("endpoint_url", &self.endpoint_url.as_str())
            .field(
                "endpoint_token",
                &self.endpoint_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("delivery_timeout", &self.delivery_timeout)
            .field("probe_interval", &self.probe_interval)
            .field("initial_status", &self.initial_status)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the endpoint token fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("STOREFRONT_DATABASE_URL");
        let host = parse_env("STOREFRONT_HOST", "127.0.0.1")?;
        let port = parse_env("STOREFRONT_PORT", "3000")?;
        let base_url = parse_url(
            "STOREFRONT_BASE_URL",
            &get_env_or_default("STOREFRONT_BASE_URL", "http://127.0.0.1:3000"),
        )?;
        let origin_url = parse_url(
            "STOREFRONT_ORIGIN_URL",
            &get_required_env("STOREFRONT_ORIGIN_URL")?,
        )?;
        let catalog_path = get_env_or_default("STOREFRONT_CATALOG_PATH", "parts.json");
        let cache_name = get_env_or_default("STOREFRONT_CACHE_NAME", "pwa-commerce-v1");

        let sync = SyncConfig::from_env(&origin_url)?;

        let vapid_public_key = get_optional_env("VAPID_PUBLIC_KEY")
            .map(|key| {
                decode_application_server_key(&key).map_err(|e| {
                    ConfigError::InvalidEnvVar("VAPID_PUBLIC_KEY".to_string(), e.to_string())
                })
            })
            .transpose()?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            origin_url,
            catalog_path,
            cache_name,
            sync,
            vapid_public_key,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Absolute URL of the catalog at the origin.
    ///
    /// # Errors
    ///
    /// Returns `url::ParseError` if the catalog path is not a valid relative URL.
    pub fn catalog_url(&self) -> Result<Url, url::ParseError> {
        self.origin_url.join(&self.catalog_path)
    }
}

impl SyncConfig {
    fn from_env(origin_url: &Url) -> Result<Self, ConfigError> {
        let endpoint_url = match get_optional_env("SYNC_ENDPOINT_URL") {
            Some(url) => parse_url("SYNC_ENDPOINT_URL", &url)?,
            None => origin_url.join("api/cart/add").map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_ORIGIN_URL".to_string(), e.to_string())
            })?,
        };

        let endpoint_token = get_optional_env("SYNC_ENDPOINT_TOKEN")
            .map(|token| {
                validate_secret_strength(&token, "SYNC_ENDPOINT_TOKEN")?;
                Ok::<_, ConfigError>(SecretString::from(token))
            })
            .transpose()?;

        let delivery_timeout =
            Duration::from_secs(parse_env("SYNC_DELIVERY_TIMEOUT_SECS", "10")?);
        let probe_secs: u64 = parse_env("SYNC_PROBE_INTERVAL_SECS", "0")?;
        let probe_interval = (probe_secs > 0).then(|| Duration::from_secs(probe_secs));

        let start_online: bool = parse_env("SYNC_START_ONLINE", "true")?;

        Ok(Self {
            endpoint_url,
            endpoint_token,
            delivery_timeout,
            probe_interval,
            initial_status: ConnectivityStatus::from_online(start_online),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> String {
    std::env::var(primary_key)
        .or_else(|_| std::env::var("DATABASE_URL"))
        .unwrap_or_else(|_| "sqlite://pwa-commerce.db".to_string())
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a URL-valued variable.
fn parse_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}
