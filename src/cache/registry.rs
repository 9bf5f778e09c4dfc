//! Cache registry
//!
//! The registry owns the live cache settings: the store handle and the
//! configuration it was initialized with. It is an ordinary value passed to
//! the code that needs it (usually behind an `Arc`), so independent
//! registries can coexist in one process.
//!
//! Every cache operation takes one snapshot of the settings and uses it for
//! its whole duration. Re-initializing swaps the snapshot atomically;
//! in-flight operations finish against the settings they started with.

use crate::cache::codec::{BincodeCodec, Codec};
use crate::cache::config::CacheConfig;
use crate::cache::hash::HashFunction;
use crate::cache::key::{CallArgs, KeyBuilder, KeyContext};
use crate::cache::types::{CacheKey, CacheStats, StatsCounters};
use crate::connection::{self, HealthCheckResult};
use crate::error::{CacheError, Result};
use crate::store::Store;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Immutable snapshot of an initialized registry
pub struct RegistrySettings<C: Codec = BincodeCodec> {
    store: Arc<dyn Store>,
    config: CacheConfig<C>,
}

impl<C: Codec> RegistrySettings<C> {
    /// The store adapter
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Shared handle to the store adapter
    pub fn store_handle(&self) -> Arc<dyn Store> {
        Arc::clone(&self.store)
    }

    /// Full configuration
    pub fn config(&self) -> &CacheConfig<C> {
        &self.config
    }

    pub fn prefix(&self) -> &str {
        &self.config.prefix
    }

    pub fn namespace_token(&self) -> &str {
        &self.config.namespace_token
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.config.default_ttl
    }

    pub fn codec(&self) -> &C {
        &self.config.codec
    }

    pub fn hasher(&self) -> &dyn HashFunction {
        self.config.hasher.as_ref()
    }

    pub fn key_builder(&self) -> &dyn KeyBuilder {
        self.config.key_builder.as_ref()
    }

    /// Key under which a call's result is stored
    pub fn build_key(&self, handler: &str, args: &CallArgs) -> CacheKey {
        let ctx = KeyContext {
            prefix: &self.config.prefix,
            namespace_token: &self.config.namespace_token,
            hasher: self.config.hasher.as_ref(),
        };
        self.config.key_builder.build(&ctx, handler, args)
    }
}

impl<C: Codec> fmt::Debug for RegistrySettings<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrySettings")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Process-wide cache settings, injected where caching is used
///
/// # Example
/// ```no_run
/// use fingerprint_cache::{CacheConfig, CacheRegistry, RedisStore};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let store = RedisStore::from_env().await?;
///     let registry = Arc::new(CacheRegistry::new());
///     registry
///         .initialize(Arc::new(store), CacheConfig::builder().prefix("api").build())
///         .await?;
///
///     registry.check_connection().await?;
///     Ok(())
/// }
/// ```
pub struct CacheRegistry<C: Codec = BincodeCodec> {
    settings: RwLock<Option<Arc<RegistrySettings<C>>>>,
    pub(crate) stats: StatsCounters,
}

impl CacheRegistry {
    /// Create an unconfigured registry using the default codec
    pub fn new() -> Self {
        Self::unconfigured()
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> CacheRegistry<C> {
    /// Create an unconfigured registry for any codec
    ///
    /// Cache operations fail with a configuration error until
    /// [`initialize`](Self::initialize) is called.
    pub fn unconfigured() -> Self {
        Self {
            settings: RwLock::new(None),
            stats: StatsCounters::default(),
        }
    }

    /// Create a registry that is ready to use
    pub fn with_store(store: Arc<dyn Store>, config: CacheConfig<C>) -> Result<Self> {
        config.validate()?;
        info!("Cache registry configured with prefix '{}'", config.prefix);

        Ok(Self {
            settings: RwLock::new(Some(Arc::new(RegistrySettings { store, config }))),
            stats: StatsCounters::default(),
        })
    }

    /// Install settings, replacing any previous ones as a unit
    ///
    /// The previous store is not closed; it may still be shared elsewhere.
    pub async fn initialize(&self, store: Arc<dyn Store>, config: CacheConfig<C>) -> Result<()> {
        config.validate()?;

        let prefix = config.prefix.clone();
        let previous = self
            .settings
            .write()
            .await
            .replace(Arc::new(RegistrySettings { store, config }));

        if previous.is_some() {
            info!("Cache registry re-initialized with prefix '{}'", prefix);
        } else {
            info!("Cache registry initialized with prefix '{}'", prefix);
        }
        Ok(())
    }

    /// Whether settings are installed
    pub async fn is_initialized(&self) -> bool {
        self.settings.read().await.is_some()
    }

    /// Snapshot of the current settings
    ///
    /// # Errors
    /// `CacheError::ConfigurationError` if the registry was never initialized
    /// or has been closed.
    pub async fn settings(&self) -> Result<Arc<RegistrySettings<C>>> {
        self.settings.read().await.clone().ok_or_else(|| {
            CacheError::ConfigurationError("cache registry is not initialized".to_string())
        })
    }

    /// Key a call would be stored under with the current settings
    pub async fn key_for(&self, handler: &str, args: &CallArgs) -> Result<CacheKey> {
        Ok(self.settings().await?.build_key(handler, args))
    }

    /// Verify the store answers a ping
    ///
    /// # Returns
    /// * `Ok(true)` when the store is reachable
    /// * `Err(CacheError::ConnectionError)` when no store is configured, or the
    ///   ping fails or times out
    /// * `Err(CacheError::Other)` for unexpected failures
    pub async fn check_connection(&self) -> Result<bool> {
        let settings = self.settings.read().await.clone().ok_or_else(|| {
            CacheError::ConnectionError("no store configured".to_string())
        })?;

        connection::verify_connection(settings.store(), &settings.config.health).await
    }

    /// Ping the store and report status with timing
    pub async fn health_check_detailed(&self) -> HealthCheckResult {
        // Bound first so the read guard is released before the ping
        let settings = self.settings.read().await.clone();

        match settings {
            Some(settings) => {
                connection::health_check_detailed(settings.store(), &settings.config.health).await
            }
            None => HealthCheckResult::unhealthy(Duration::ZERO, "no store configured"),
        }
    }

    /// Close the store connection and drop the settings
    ///
    /// Later cache operations fail with a configuration error until the
    /// registry is initialized again. Closing an unconfigured registry is a
    /// no-op.
    pub async fn close(&self) -> Result<()> {
        let settings = self.settings.write().await.take();

        match settings {
            Some(settings) => {
                settings.store().close().await?;
                info!("Cache registry closed");
            }
            None => debug!("Cache registry close requested while unconfigured"),
        }
        Ok(())
    }

    /// Snapshot of hit/miss/store/invalidation counters
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Reset all counters to zero
    pub fn reset_stats(&self) {
        self.stats.reset();
    }
}

impl<C: Codec> fmt::Debug for CacheRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}
