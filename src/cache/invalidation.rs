//! Pattern-based invalidation
//!
//! Keys are enumerated with the store's incremental scan and deleted in
//! batches of `delete_batch_size`. A sweep is not atomic: keys written while it runs
//! may survive it, and keys already deleted stay deleted if a later batch
//! fails.

use crate::cache::codec::Codec;
use crate::cache::registry::{CacheRegistry, RegistrySettings};
use crate::cache::types::CacheKey;
use crate::error::Result;
use crate::store::escape_pattern;
use futures::TryStreamExt;
use tracing::{debug, info};

impl<C: Codec> RegistrySettings<C> {
    /// Glob mask for `pattern`
    ///
    /// With `use_prefix` the mask is `{prefix}/{pattern}`, the prefix escaped
    /// so it only matches itself.
    pub fn mask(&self, pattern: &str, use_prefix: bool) -> String {
        if use_prefix {
            format!("{}/{}", escape_pattern(self.prefix()), pattern)
        } else {
            pattern.to_string()
        }
    }
}

impl<C: Codec> CacheRegistry<C> {
    /// Keys matching `pattern`, in the order the store enumerated them
    pub async fn list_keys(&self, pattern: &str, use_prefix: bool) -> Result<Vec<CacheKey>> {
        let settings = self.settings().await?;
        let mask = settings.mask(pattern, use_prefix);

        let keys: Vec<CacheKey> = settings.store().scan(&mask).try_collect().await?;
        debug!("Listed {} keys matching '{}'", keys.len(), mask);
        Ok(keys)
    }

    /// Every key under the configured prefix
    pub async fn list_all_keys(&self) -> Result<Vec<CacheKey>> {
        self.list_keys("*", true).await
    }

    /// Delete keys matching `pattern`, returning how many were deleted
    ///
    /// The count comes from the store's delete replies, so keys the scan
    /// reported twice or that expired before their batch ran are not counted.
    pub async fn invalidate(&self, pattern: &str, use_prefix: bool) -> Result<usize> {
        let settings = self.settings().await?;
        let mask = settings.mask(pattern, use_prefix);
        let batch_size = settings.config().delete_batch_size;
        let store = settings.store();

        let mut scan = store.scan(&mask);
        let mut batch: Vec<CacheKey> = Vec::with_capacity(batch_size);
        let mut deleted = 0;

        while let Some(key) = scan.try_next().await? {
            batch.push(key);
            if batch.len() >= batch_size {
                let removed = store.delete_many(&batch).await?;
                deleted += removed;
                self.stats.record_invalidated(removed as u64);
                batch.clear();
            }
        }

        if !batch.is_empty() {
            let removed = store.delete_many(&batch).await?;
            deleted += removed;
            self.stats.record_invalidated(removed as u64);
        }

        info!("Invalidated {} keys matching '{}'", deleted, mask);
        Ok(deleted)
    }

    /// Delete every key under the configured prefix
    pub async fn invalidate_all(&self) -> Result<usize> {
        self.invalidate("*", true).await
    }

    /// Delete every cached result of one handler
    pub async fn invalidate_handler(&self, handler: &str) -> Result<usize> {
        let pattern = format!("{}:*", escape_pattern(handler));
        self.invalidate(&pattern, true).await
    }
}
