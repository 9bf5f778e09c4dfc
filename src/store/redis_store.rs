//! Redis store adapter
//!
//! Uses a [`ConnectionManager`]: a single multiplexed connection that pipelines
//! concurrent commands and reconnects after failures. Cloning the store clones
//! the handle, not the connection. Clones also share the closed flag, so
//! [`Store::close`] on any of them stops all of them.

use crate::cache::types::CacheKey;
use crate::error::{CacheError, Result};
use crate::store::Store;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use redis::aio::ConnectionManager;
use redis::{ErrorKind, RedisError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default connection URL when `REDIS_URL` is not set
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// `COUNT` hint sent with every `SCAN`
pub const DEFAULT_SCAN_COUNT: usize = 100;

/// Classify a driver error into the cache error taxonomy
fn store_error(e: RedisError) -> CacheError {
    if e.kind() == ErrorKind::IoError
        || e.is_io_error()
        || e.is_connection_refusal()
        || e.is_connection_dropped()
        || e.is_timeout()
    {
        CacheError::ConnectionError(e.to_string())
    } else {
        CacheError::StoreOperationError(e.to_string())
    }
}

/// [`Store`] backed by Redis
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    closed: Arc<AtomicBool>,
    scan_count: usize,
}

impl RedisStore {
    /// Connect to Redis
    ///
    /// # Example
    /// ```no_run
    /// use fingerprint_cache::RedisStore;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let store = RedisStore::connect("redis://127.0.0.1:6379").await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| CacheError::ConfigurationError(format!("invalid Redis URL: {}", e)))?;

        info!("Connecting to Redis (db {})", client.get_connection_info().redis.db);

        let manager = ConnectionManager::new(client).await.map_err(store_error)?;

        info!("Successfully connected to Redis");
        Ok(Self::from_manager(manager))
    }

    /// Connect using `REDIS_URL` (loaded from `.env` when present)
    pub async fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());
        Self::connect(&url).await
    }

    /// Wrap an existing connection manager
    pub fn from_manager(manager: ConnectionManager) -> Self {
        Self {
            manager,
            closed: Arc::new(AtomicBool::new(false)),
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }

    /// Set the `COUNT` hint used by `SCAN`
    pub fn with_scan_count(mut self, count: usize) -> Self {
        self.scan_count = count.max(1);
        self
    }

    /// Handle to the underlying connection for commands outside the cache contract
    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// Whether [`Store::close`] has been called on this store or a clone
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Connection handle for the next command, refused once closed
    fn open_connection(&self) -> Result<ConnectionManager> {
        if self.is_closed() {
            Err(CacheError::ConnectionError("redis store is closed".to_string()))
        } else {
            Ok(self.manager.clone())
        }
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.open_connection()?;
        let present: bool = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(present)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.open_connection()?;
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.open_connection()?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);

        // PX keeps sub-second TTLs; Redis rejects 0
        if let Some(ttl) = ttl {
            let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            cmd.arg("PX").arg(millis);
        }

        let _: () = cmd.query_async(&mut conn).await.map_err(store_error)?;
        Ok(())
    }

    fn scan<'a>(&'a self, pattern: &'a str) -> BoxStream<'a, Result<CacheKey>> {
        let count = self.scan_count;

        stream::unfold(Some(0u64), move |state| async move {
            let cursor = state?;
            let mut conn = match self.open_connection() {
                Ok(conn) => conn,
                Err(e) => return Some((Err(e), None)),
            };

            let reply: redis::RedisResult<(u64, Vec<String>)> = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(count)
                .query_async(&mut conn)
                .await;

            match reply {
                Ok((next, keys)) => {
                    debug!("SCAN {} MATCH {}: {} keys, next cursor {}", cursor, pattern, keys.len(), next);
                    let next_state = if next == 0 { None } else { Some(next) };
                    Some((Ok(keys), next_state))
                }
                Err(e) => Some((Err(store_error(e)), None)),
            }
        })
        .map_ok(|keys| stream::iter(keys.into_iter().map(Ok::<CacheKey, CacheError>)))
        .try_flatten()
        .boxed()
    }

    async fn delete_many(&self, keys: &[CacheKey]) -> Result<usize> {
        let mut conn = self.open_connection()?;
        if keys.is_empty() {
            return Ok(0);
        }

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("DEL").arg(key);
        }

        // One reply per DEL: 1 if the key was removed, 0 if it was already gone
        let replies: Vec<usize> = pipe.query_async(&mut conn).await.map_err(store_error)?;
        let removed: usize = replies.into_iter().sum();
        debug!("Deleted {} of {} keys in batch", removed, keys.len());
        Ok(removed)
    }

    async fn ping(&self) -> Result<bool> {
        let mut conn = self.open_connection()?;
        let reply: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(reply == "PONG")
    }

    async fn close(&self) -> Result<()> {
        // The multiplexed connection itself shuts down once the last handle is dropped
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Redis store closed");
        }
        Ok(())
    }
}
