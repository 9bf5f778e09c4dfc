//! Stored entry with optional expiration

use crate::error::{CacheError, Result};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// An encoded value held by [`MemoryStore`](crate::store::MemoryStore)
#[derive(Debug, Clone)]
pub struct StoredEntry {
    /// Encoded bytes
    pub value: Vec<u8>,

    /// When the entry was written
    pub created_at: DateTime<Utc>,

    /// When the entry stops being live; `None` for persistent entries
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
    /// Create an entry that never expires
    pub fn persistent(value: Vec<u8>) -> Self {
        Self {
            value,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Create an entry expiring `ttl` from now
    pub fn expiring(value: Vec<u8>, ttl: Duration) -> Result<Self> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CacheError::StoreOperationError(format!("invalid expire time: {}", e)))?;
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| CacheError::StoreOperationError("invalid expire time".to_string()))?;

        Ok(Self {
            value,
            created_at: now,
            expires_at: Some(expires_at),
        })
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub(crate) fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if now >= expires_at)
    }

    /// Get time until expiration; `None` for persistent or expired entries
    pub fn time_until_expiration(&self) -> Option<Duration> {
        let expires_at = self.expires_at?;
        (expires_at - Utc::now()).to_std().ok()
    }

    /// Get the age of the entry
    pub fn age(&self) -> Duration {
        (Utc::now() - self.created_at)
            .to_std()
            .unwrap_or(Duration::from_secs(0))
    }
}
