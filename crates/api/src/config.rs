use std::str::FromStr;
use std::time::Duration;

use staybook_core::geo_index::{
    DEFAULT_LEASE_SWEEP_INTERVAL_SECS, DEFAULT_LEASE_TTL_SECS, DEFAULT_RETIRE_GRACE_SECS,
};
use staybook_core::retry::{RetryPolicy, DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_ATTEMPTS};

/// Read `name` from the environment, falling back to `default`.
///
/// Panics at startup on an unparseable value.
fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{name} has an invalid value '{raw}': {e}")),
        Err(_) => default,
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for background tasks (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Connection pool size (default: `20`).
    pub db_max_connections: u32,
    pub resolver: ResolverConfig,
    pub geo_index: GeoIndexConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    /// | `DB_MAX_CONNECTIONS`   | `20`                       |
    ///
    /// See [`ResolverConfig::from_env`] and [`GeoIndexConfig::from_env`] for
    /// the engine settings.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host,
            port: env_or("PORT", 3000),
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", 30),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", staybook_db::DEFAULT_MAX_CONNECTIONS),
            resolver: ResolverConfig::from_env(),
            geo_index: GeoIndexConfig::from_env(),
        }
    }
}

// ---------------------------------------------------------------------------
// Entity resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ResolverConfig {
    /// Total lookup attempts per kind, first try included.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    /// `0` disables the resolution cache.
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            cache_ttl_secs: 0,
            cache_capacity: 1000,
        }
    }
}

impl ResolverConfig {
    /// | Env Var                       | Default |
    /// |-------------------------------|---------|
    /// | `RESOLVER_MAX_ATTEMPTS`       | `3`     |
    /// | `RESOLVER_INITIAL_BACKOFF_MS` | `100`   |
    /// | `RESOLVER_CACHE_TTL_SECS`     | `0`     |
    /// | `RESOLVER_CACHE_CAPACITY`     | `1000`  |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_or("RESOLVER_MAX_ATTEMPTS", defaults.max_attempts),
            initial_backoff_ms: env_or("RESOLVER_INITIAL_BACKOFF_MS", defaults.initial_backoff_ms),
            cache_ttl_secs: env_or("RESOLVER_CACHE_TTL_SECS", defaults.cache_ttl_secs),
            cache_capacity: env_or("RESOLVER_CACHE_CAPACITY", defaults.cache_capacity),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.initial_backoff_ms))
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0 && self.cache_capacity > 0)
            .then(|| Duration::from_secs(self.cache_ttl_secs))
    }
}

// ---------------------------------------------------------------------------
// Geospatial index lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct GeoIndexConfig {
    pub lease_ttl_secs: u64,
    /// Drain window between `retiring` and the physical drop.
    pub retire_grace_secs: u64,
    /// Build the index at startup if it is absent.
    pub auto_ensure: bool,
    pub lease_sweep_interval_secs: u64,
    /// Prefix of lease holder ids, to tell instances apart in logs.
    pub instance_id: String,
}

impl Default for GeoIndexConfig {
    fn default() -> Self {
        Self {
            lease_ttl_secs: DEFAULT_LEASE_TTL_SECS,
            retire_grace_secs: DEFAULT_RETIRE_GRACE_SECS,
            auto_ensure: false,
            lease_sweep_interval_secs: DEFAULT_LEASE_SWEEP_INTERVAL_SECS,
            instance_id: "staybook-api".to_string(),
        }
    }
}

impl GeoIndexConfig {
    /// | Env Var                       | Default        |
    /// |-------------------------------|----------------|
    /// | `GEO_INDEX_LEASE_TTL_SECS`    | `600`          |
    /// | `GEO_INDEX_RETIRE_GRACE_SECS` | `30`           |
    /// | `GEO_INDEX_AUTO_ENSURE`       | `false`        |
    /// | `LEASE_SWEEP_INTERVAL_SECS`   | `60`           |
    /// | `HOSTNAME`                    | `staybook-api` |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            lease_ttl_secs: env_or("GEO_INDEX_LEASE_TTL_SECS", defaults.lease_ttl_secs),
            retire_grace_secs: env_or("GEO_INDEX_RETIRE_GRACE_SECS", defaults.retire_grace_secs),
            auto_ensure: env_or("GEO_INDEX_AUTO_ENSURE", defaults.auto_ensure),
            lease_sweep_interval_secs: env_or(
                "LEASE_SWEEP_INTERVAL_SECS",
                defaults.lease_sweep_interval_secs,
            ),
            instance_id: std::env::var("HOSTNAME").unwrap_or(defaults.instance_id),
        }
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    pub fn retire_grace(&self) -> Duration {
        Duration::from_secs(self.retire_grace_secs)
    }

    pub fn lease_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.lease_sweep_interval_secs.max(1))
    }
}
