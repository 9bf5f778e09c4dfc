//! Cache-aside execution
//!
//! For each invocation: derive the key, check existence, then either decode
//! the stored value or run the computation and store its encoded result.
//! There is no single-flight coordination; concurrent misses on one key each
//! compute and each write, and the last write wins.

use crate::cache::codec::{BincodeCodec, Codec};
use crate::cache::key::{CacheArgs, CallArgs};
use crate::cache::registry::CacheRegistry;
use crate::error::{CacheError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

impl<C: Codec> CacheRegistry<C> {
    /// Return the cached result of a call, computing and storing it on a miss
    ///
    /// `ttl` overrides the configured default for this write. A zero
    /// duration, or no TTL at all, stores the entry without expiration.
    ///
    /// # Errors
    /// - `ConfigurationError` if the registry is not initialized
    /// - `DeserializationError` if a stored entry cannot be decoded; the
    ///   computation is not run as a fallback
    /// - store failures from any of the round trips
    pub async fn run<T, F, Fut>(
        &self,
        handler: &str,
        args: &CallArgs,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.try_run(handler, args, ttl, move || async move {
            Ok::<T, CacheError>(compute().await)
        })
        .await
    }

    /// Like [`run`](Self::run) for fallible computations
    ///
    /// A failed computation is returned as-is and nothing is written.
    pub async fn try_run<T, E, F, Fut>(
        &self,
        handler: &str,
        args: &CallArgs,
        ttl: Option<Duration>,
        compute: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let settings = self.settings().await?;
        let key = settings.build_key(handler, args);
        let store = settings.store();

        if store.exists(&key).await? {
            match store.get(&key).await? {
                Some(bytes) => {
                    let value = settings.codec().decode(&bytes)?;
                    self.stats.record_hit();
                    debug!("Cache hit: {}", key);
                    return Ok(value);
                }
                // Expired between the two round trips
                None => debug!("Cache entry vanished before read: {}", key),
            }
        }

        self.stats.record_miss();
        debug!("Cache miss: {}", key);

        let value = compute().await?;
        let bytes = settings.codec().encode(&value)?;
        let ttl = settings.config().effective_ttl(ttl);

        store.set(&key, bytes, ttl).await?;
        self.stats.record_store();
        debug!("Cached {} (ttl: {:?})", key, ttl);

        Ok(value)
    }

    /// Wrap an async function so its results are cached under `handler`
    ///
    /// # Example
    /// ```no_run
    /// use fingerprint_cache::{handler_identity, CacheConfig, CacheRegistry, MemoryStore};
    /// use std::sync::Arc;
    ///
    /// async fn report(user_id: u64, day: String) -> Vec<String> {
    ///     vec![format!("{}:{}", user_id, day)]
    /// }
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let registry = Arc::new(CacheRegistry::with_store(
    ///         Arc::new(MemoryStore::new()),
    ///         CacheConfig::builder().prefix("api").build(),
    ///     )?);
    ///
    ///     let cached = registry.cached(handler_identity!(report), |(user_id, day): (u64, String)| {
    ///         report(user_id, day)
    ///     });
    ///
    ///     let rows = cached.call((7u64, "monday".to_string())).await?;
    ///     assert_eq!(rows, vec!["7:monday".to_string()]);
    ///     Ok(())
    /// }
    /// ```
    pub fn cached<F>(self: &Arc<Self>, handler: impl Into<String>, func: F) -> CachedFn<F, C> {
        CachedFn {
            registry: Arc::clone(self),
            handler: handler.into(),
            ttl: None,
            func,
        }
    }
}

/// An async function whose results are served through a registry
pub struct CachedFn<F, C: Codec = BincodeCodec> {
    registry: Arc<CacheRegistry<C>>,
    handler: String,
    ttl: Option<Duration>,
    func: F,
}

impl<F, C: Codec> CachedFn<F, C> {
    /// Override the registry's default TTL for this function
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Handler identity used in keys
    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// Registry backing this function
    pub fn registry(&self) -> &Arc<CacheRegistry<C>> {
        &self.registry
    }

    /// Call through the cache
    pub async fn call<A, T, Fut>(&self, args: A) -> Result<T>
    where
        A: CacheArgs,
        F: Fn(A) -> Fut,
        Fut: Future<Output = T>,
        T: Serialize + DeserializeOwned,
    {
        let call_args = args.call_args();
        self.registry
            .run(&self.handler, &call_args, self.ttl, move || (self.func)(args))
            .await
    }

    /// Call a fallible function through the cache; errors are never cached
    pub async fn try_call<A, T, E, Fut>(&self, args: A) -> std::result::Result<T, E>
    where
        A: CacheArgs,
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
    {
        let call_args = args.call_args();
        self.registry
            .try_run(&self.handler, &call_args, self.ttl, move || (self.func)(args))
            .await
    }

    /// Remove every cached result of this function
    pub async fn invalidate(&self) -> Result<usize> {
        self.registry.invalidate_handler(&self.handler).await
    }
}
