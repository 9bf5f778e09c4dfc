//! Configuration for the cache registry

use crate::cache::codec::{BincodeCodec, Codec};
use crate::cache::hash::{HashFunction, Sha256Hash};
use crate::cache::key::{ContextStrippingKeyBuilder, KeyBuilder};
use crate::connection::HealthCheckConfig;
use crate::error::{CacheError, Result};
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Namespace token mixed into every fingerprint
pub const DEFAULT_NAMESPACE_TOKEN: &str = "FARCv1";

/// TTL applied when a call gives no override
pub const DEFAULT_TTL: Duration = Duration::from_secs(10);

/// Keys deleted per batch during invalidation
pub const DEFAULT_DELETE_BATCH_SIZE: usize = 500;

/// Configuration for a [`CacheRegistry`](crate::cache::CacheRegistry)
///
/// `default_ttl: None` (or a zero duration) stores entries without expiration.
#[derive(Debug, Clone)]
pub struct CacheConfig<C: Codec = BincodeCodec> {
    /// Prefix placed in front of every key, `{prefix}/{handler}:{digest}`
    pub prefix: String,

    /// Token hashed into every fingerprint; changing it orphans old entries
    pub namespace_token: String,

    /// Default time-to-live for cache entries
    pub default_ttl: Option<Duration>,

    /// TTL jitter factor (0.0 - 1.0)
    /// Spreads expirations of entries written together
    pub ttl_jitter: f64,

    /// Keys per delete batch during invalidation
    pub delete_batch_size: usize,

    /// Digest used for fingerprints
    pub hasher: Arc<dyn HashFunction>,

    /// Strategy mapping a call to a key
    pub key_builder: Arc<dyn KeyBuilder>,

    /// Value serialization
    pub codec: C,

    /// Ping timeout and degraded threshold
    pub health: HealthCheckConfig,
}

impl<C: Codec + Default> Default for CacheConfig<C> {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            namespace_token: DEFAULT_NAMESPACE_TOKEN.to_string(),
            default_ttl: Some(DEFAULT_TTL),
            ttl_jitter: 0.0,
            delete_batch_size: DEFAULT_DELETE_BATCH_SIZE,
            hasher: Arc::new(Sha256Hash),
            key_builder: Arc::new(ContextStrippingKeyBuilder::new()),
            codec: C::default(),
            health: HealthCheckConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Build a configuration from `CACHE_*` environment variables
    ///
    /// A `.env` file is loaded first when present. Unset variables keep their
    /// defaults; `CACHE_DEFAULT_TTL_SECS=0` disables expiration.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut builder = Self::builder();

        if let Ok(prefix) = env::var("CACHE_PREFIX") {
            builder = builder.prefix(prefix);
        }
        if let Ok(token) = env::var("CACHE_NAMESPACE_TOKEN") {
            builder = builder.namespace_token(token);
        }
        if let Some(secs) = parse_env::<u64>("CACHE_DEFAULT_TTL_SECS")? {
            builder = match secs {
                0 => builder.no_expiration(),
                secs => builder.default_ttl(Duration::from_secs(secs)),
            };
        }
        if let Some(jitter) = parse_env::<f64>("CACHE_TTL_JITTER")? {
            builder = builder.ttl_jitter(jitter);
        }
        if let Some(size) = parse_env::<usize>("CACHE_DELETE_BATCH")? {
            builder = builder.delete_batch_size(size);
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }
}

fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            CacheError::ConfigurationError(format!("invalid {}={:?}: {}", name, raw, e))
        }),
        Err(_) => Ok(None),
    }
}

impl<C: Codec> CacheConfig<C> {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err(CacheError::ConfigurationError(
                "ttl_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.delete_batch_size == 0 {
            return Err(CacheError::ConfigurationError(
                "delete_batch_size must be greater than 0".to_string(),
            ));
        }

        if self.health.timeout.is_zero() {
            return Err(CacheError::ConfigurationError(
                "health check timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Calculate actual TTL with jitter applied
    pub fn ttl_with_jitter(&self, ttl: Duration) -> Duration {
        if self.ttl_jitter == 0.0 {
            return ttl;
        }

        let base_secs = ttl.as_secs_f64();
        let jitter_range = base_secs * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_secs = (base_secs + jitter).max(0.001);

        Duration::from_secs_f64(final_secs)
    }

    /// TTL for a single write
    ///
    /// The per-call override wins over the default. `None` or a zero duration
    /// means the entry never expires.
    pub fn effective_ttl(&self, override_ttl: Option<Duration>) -> Option<Duration> {
        override_ttl
            .or(self.default_ttl)
            .filter(|ttl| !ttl.is_zero())
            .map(|ttl| self.ttl_with_jitter(ttl))
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder<C: Codec = BincodeCodec> {
    prefix: Option<String>,
    namespace_token: Option<String>,
    default_ttl: Option<Option<Duration>>,
    ttl_jitter: Option<f64>,
    delete_batch_size: Option<usize>,
    hasher: Option<Arc<dyn HashFunction>>,
    key_builder: Option<Arc<dyn KeyBuilder>>,
    codec: C,
    health: Option<HealthCheckConfig>,
}

impl<C: Codec + Default> CacheConfigBuilder<C> {
    /// Set the key prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set the namespace token
    pub fn namespace_token(mut self, token: impl Into<String>) -> Self {
        self.namespace_token = Some(token.into());
        self
    }

    /// Set default TTL for cache entries
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(Some(ttl));
        self
    }

    /// Store entries without expiration unless a call overrides it
    pub fn no_expiration(mut self) -> Self {
        self.default_ttl = Some(None);
        self
    }

    /// Set TTL jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    /// Set the invalidation delete batch size
    pub fn delete_batch_size(mut self, size: usize) -> Self {
        self.delete_batch_size = Some(size);
        self
    }

    /// Set the fingerprint digest
    pub fn hasher(mut self, hasher: impl HashFunction + 'static) -> Self {
        self.hasher = Some(Arc::new(hasher));
        self
    }

    /// Set the key builder
    pub fn key_builder(mut self, builder: impl KeyBuilder + 'static) -> Self {
        self.key_builder = Some(Arc::new(builder));
        self
    }

    /// Set health check behavior
    pub fn health(mut self, health: HealthCheckConfig) -> Self {
        self.health = Some(health);
        self
    }

    /// Switch the value codec
    pub fn codec<D: Codec>(self, codec: D) -> CacheConfigBuilder<D> {
        CacheConfigBuilder {
            prefix: self.prefix,
            namespace_token: self.namespace_token,
            default_ttl: self.default_ttl,
            ttl_jitter: self.ttl_jitter,
            delete_batch_size: self.delete_batch_size,
            hasher: self.hasher,
            key_builder: self.key_builder,
            codec,
            health: self.health,
        }
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig<C> {
        let defaults = CacheConfig::<C>::default();

        CacheConfig {
            prefix: self.prefix.unwrap_or(defaults.prefix),
            namespace_token: self.namespace_token.unwrap_or(defaults.namespace_token),
            default_ttl: self.default_ttl.unwrap_or(defaults.default_ttl),
            ttl_jitter: self.ttl_jitter.unwrap_or(defaults.ttl_jitter),
            delete_batch_size: self.delete_batch_size.unwrap_or(defaults.delete_batch_size),
            hasher: self.hasher.unwrap_or(defaults.hasher),
            key_builder: self.key_builder.unwrap_or(defaults.key_builder),
            codec: self.codec,
            health: self.health.unwrap_or(defaults.health),
        }
    }
}

/// Preset configurations for common use cases
impl<C: Codec + Default> CacheConfig<C> {
    /// Rapidly changing data: one second TTL with jitter
    pub fn short_lived() -> Self {
        Self {
            default_ttl: Some(Duration::from_secs(1)),
            ttl_jitter: 0.15,
            ..Default::default()
        }
    }

    /// Entries live until invalidated
    pub fn persistent() -> Self {
        Self {
            default_ttl: None,
            ..Default::default()
        }
    }
}
