//! In-process store with TTL expiration

use crate::cache::types::CacheKey;
use crate::error::{CacheError, Result};
use crate::store::{entry::StoredEntry, pattern::GlobPattern, Store};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Number of entries examined per scan page
pub const DEFAULT_SCAN_PAGE_SIZE: usize = 100;

/// In-memory [`Store`] with the same observable behavior as the Redis adapter
///
/// - Thread-safe async access via RwLock
/// - TTL expiration checked lazily on access
/// - Cursor-paged scanning with Redis glob semantics
///
/// Clones share the same storage.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<BTreeMap<CacheKey, StoredEntry>>>,
    closed: Arc<AtomicBool>,
    scan_page_size: usize,
}

struct ScanState {
    matcher: GlobPattern,
    after: Option<CacheKey>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            closed: Arc::new(AtomicBool::new(false)),
            scan_page_size: DEFAULT_SCAN_PAGE_SIZE,
        }
    }

    /// Set how many entries a single scan page examines
    pub fn with_scan_page_size(mut self, size: usize) -> Self {
        self.scan_page_size = size.max(1);
        self
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Utc::now();
        let entries = self.entries.read().await;
        entries.values().filter(|e| !e.is_expired_at(now)).count()
    }

    /// Check if the store holds no live entries
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove all expired entries, returning how many were dropped
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - entries.len();

        if removed > 0 {
            debug!("Purged {} expired entries", removed);
        }
        removed
    }

    /// Whether [`Store::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(CacheError::ConnectionError("memory store is closed".to_string()))
        } else {
            Ok(())
        }
    }

    /// Live entry for `key`, dropping it if it has expired
    async fn live_entry(&self, key: &str) -> Option<StoredEntry> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.is_expired()) {
            debug!("Store entry expired: {}", key);
            entries.remove(key);
        }
        None
    }

    async fn scan_page(&self, state: &mut ScanState) -> (Vec<CacheKey>, bool) {
        let now = Utc::now();
        let entries = self.entries.read().await;
        let range = match &state.after {
            Some(after) => entries.range::<str, _>((Bound::Excluded(after.as_str()), Bound::Unbounded)),
            None => entries.range::<str, _>(..),
        };

        let mut page = Vec::new();
        let mut examined = 0;
        for (key, entry) in range.take(self.scan_page_size) {
            examined += 1;
            state.after = Some(key.clone());
            if !entry.is_expired_at(now) && state.matcher.matches(key) {
                page.push(key.clone());
            }
        }

        (page, examined == self.scan_page_size)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.live_entry(key).await.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        Ok(self.live_entry(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.ensure_open()?;

        let entry = match ttl {
            Some(ttl) if ttl.is_zero() => {
                return Err(CacheError::StoreOperationError(
                    "invalid expire time in 'set' command".to_string(),
                ));
            }
            Some(ttl) => StoredEntry::expiring(value, ttl)?,
            None => StoredEntry::persistent(value),
        };

        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn scan<'a>(&'a self, pattern: &'a str) -> BoxStream<'a, Result<CacheKey>> {
        let state = ScanState {
            matcher: GlobPattern::new(pattern),
            after: None,
        };

        stream::unfold(Some(state), move |state| async move {
            let mut state = state?;
            if let Err(e) = self.ensure_open() {
                return Some((Err(e), None));
            }

            let (page, more) = self.scan_page(&mut state).await;
            debug!("Scan page for '{}': {} matching keys", pattern, page.len());
            Some((Ok(page), more.then_some(state)))
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<CacheKey, CacheError>)))
        .try_flatten()
        .boxed()
    }

    async fn delete_many(&self, keys: &[CacheKey]) -> Result<usize> {
        self.ensure_open()?;

        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let removed = keys
            .iter()
            .filter(|key| {
                entries
                    .remove(key.as_str())
                    .is_some_and(|entry| !entry.is_expired_at(now))
            })
            .count();
        Ok(removed)
    }

    async fn ping(&self) -> Result<bool> {
        self.ensure_open()?;
        Ok(true)
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Memory store closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn keys(store: &MemoryStore, pattern: &str) -> Vec<CacheKey> {
        store.scan(pattern).try_collect().await.unwrap()
    }

    #[tokio::test]
    async fn test_basic_set_and_get() {
        let store = MemoryStore::new();

        store.set("key1", b"value1".to_vec(), None).await.unwrap();

        assert!(store.exists("key1").await.unwrap());
        assert_eq!(store.get("key1").await.unwrap(), Some(b"value1".to_vec()));
        assert_eq!(store.get("missing").await.unwrap(), None);
        assert!(!store.exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = MemoryStore::new();

        store.set("k", b"old".to_vec(), None).await.unwrap();
        store.set("k", b"new".to_vec(), None).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some(b"new".to_vec()));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let store = MemoryStore::new();

        store
            .set("expiring", b"v".to_vec(), Some(Duration::from_millis(100)))
            .await
            .unwrap();

        // Should be available immediately
        assert!(store.exists("expiring").await.unwrap());

        // Wait for expiration
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(!store.exists("expiring").await.unwrap());
        assert_eq!(store.get("expiring").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_rejected() {
        let store = MemoryStore::new();
        let result = store.set("k", Vec::new(), Some(Duration::ZERO)).await;
        assert!(matches!(result, Err(CacheError::StoreOperationError(_))));
    }

    #[tokio::test]
    async fn test_scan_pages_through_all_matches() {
        let store = MemoryStore::new().with_scan_page_size(3);

        for i in 0..10 {
            store.set(&format!("app/h:{:02}", i), Vec::new(), None).await.unwrap();
        }
        store.set("other/h:00", Vec::new(), None).await.unwrap();

        let found = keys(&store, "app/*").await;
        assert_eq!(found.len(), 10);
        assert_eq!(found.first().map(String::as_str), Some("app/h:00"));

        assert_eq!(keys(&store, "*").await.len(), 11);
        assert!(keys(&store, "none/*").await.is_empty());
    }

    #[tokio::test]
    async fn test_scan_skips_expired_entries() {
        let store = MemoryStore::new();

        store.set("a", Vec::new(), Some(Duration::from_millis(20))).await.unwrap();
        store.set("b", Vec::new(), None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(keys(&store, "*").await, vec!["b".to_string()]);
        assert_eq!(store.purge_expired().await, 1);
    }

    #[tokio::test]
    async fn test_delete_many_ignores_absent_keys() {
        let store = MemoryStore::new();

        store.set("a", Vec::new(), None).await.unwrap();
        store.set("b", Vec::new(), None).await.unwrap();

        let removed = store
            .delete_many(&["a".to_string(), "zzz".to_string(), "a".to_string()])
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(!store.exists("a").await.unwrap());
        assert!(store.exists("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_many_does_not_count_expired_entries() {
        let store = MemoryStore::new();

        store.set("gone", Vec::new(), Some(Duration::from_millis(20))).await.unwrap();
        store.set("live", Vec::new(), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let removed = store
            .delete_many(&["gone".to_string(), "live".to_string()])
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_closed_store_rejects_operations() {
        let store = MemoryStore::new();
        store.set("a", Vec::new(), None).await.unwrap();
        assert!(store.ping().await.unwrap());

        store.close().await.unwrap();

        assert!(store.is_closed());
        assert!(matches!(store.ping().await, Err(CacheError::ConnectionError(_))));
        assert!(matches!(store.get("a").await, Err(CacheError::ConnectionError(_))));

        let scanned: Result<Vec<CacheKey>> = store.scan("*").try_collect().await;
        assert!(matches!(scanned, Err(CacheError::ConnectionError(_))));
    }

    #[tokio::test]
    async fn test_clones_share_storage() {
        let store = MemoryStore::new();
        let other = store.clone();

        store.set("shared", b"1".to_vec(), None).await.unwrap();
        assert!(other.exists("shared").await.unwrap());
    }
}
