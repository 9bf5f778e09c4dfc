//! Key-value store adapters
//!
//! The cache consumes its backing store only through the [`Store`] trait.
//! Implementations own connection handling; they must accept concurrent calls
//! from many in-flight cache operations without external locking, and a single
//! `set` must be atomic with respect to cancellation (fully sent or not sent).
//!
//! Two adapters ship with the crate:
//! - [`RedisStore`]: Redis through a multiplexed connection manager
//! - [`MemoryStore`]: in-process store with the same semantics, for tests and
//!   single-process deployments

pub mod entry;
pub mod memory;
pub mod pattern;
pub mod redis_store;

pub use entry::StoredEntry;
pub use memory::MemoryStore;
pub use pattern::{escape_pattern, GlobPattern};
pub use redis_store::RedisStore;

use crate::cache::types::CacheKey;
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;

/// Contract of the backing key-value store
#[async_trait]
pub trait Store: Send + Sync {
    /// True iff a live (non-expired) entry is present
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Raw encoded bytes, `None` when absent
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Overwrite `key`; the entry expires after `ttl` when given, never otherwise
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Incremental enumeration of keys matching a glob pattern
    ///
    /// The stream fetches keys page by page and never lists the whole keyspace
    /// in one blocking call. Each call starts a fresh enumeration.
    fn scan<'a>(&'a self, pattern: &'a str) -> BoxStream<'a, Result<CacheKey>>;

    /// Remove all given keys, returning how many live entries were removed
    ///
    /// Absent and already-expired keys are ignored and not counted.
    async fn delete_many(&self, keys: &[CacheKey]) -> Result<usize>;

    /// Liveness check
    async fn ping(&self) -> Result<bool>;

    /// Release the connection
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
