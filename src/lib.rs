//! # fingerprint-cache
//!
//! A cache-aside layer for async request handlers, backed by Redis.
//!
//! ## Features
//!
//! - Deterministic keys: `{prefix}/{handler}:{digest}` over a canonical
//!   rendering of the call arguments
//! - Per-call context (requests, responses, connections) excluded from keys
//! - Pluggable serialization, hashing and key building
//! - TTL per registry with per-call overrides
//! - Glob-pattern invalidation driven by incremental scans
//! - Redis and in-memory store adapters
//! - Connection checks with degraded state detection
//!
//! ## Caching a Handler
//!
//! ```no_run
//! use fingerprint_cache::{handler_identity, CacheConfig, CacheRegistry, CallContext, RedisStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct Request {
//!     trace_id: String,
//! }
//!
//! async fn daily_report(day: String, _request: Arc<Request>) -> Vec<String> {
//!     vec![format!("report for {}", day)]
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = RedisStore::from_env().await?;
//!     let registry = Arc::new(CacheRegistry::with_store(
//!         Arc::new(store),
//!         CacheConfig::from_env()?,
//!     )?);
//!     registry.check_connection().await?;
//!
//!     let report = registry
//!         .cached(
//!             handler_identity!(daily_report),
//!             |(day, request): (String, CallContext<Arc<Request>>)| {
//!                 daily_report(day, request.into_inner())
//!             },
//!         )
//!         .with_ttl(Duration::from_secs(300));
//!
//!     let request = Arc::new(Request { trace_id: "abc".into() });
//!     let rows = report
//!         .call(("2024-01-01".to_string(), CallContext(request)))
//!         .await?;
//!     println!("{:?}", rows);
//!     Ok(())
//! }
//! ```
//!
//! ## Invalidation
//!
//! ```no_run
//! use fingerprint_cache::{CacheConfig, CacheRegistry, RedisStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = RedisStore::from_env().await?;
//!     let registry = CacheRegistry::with_store(
//!         Arc::new(store),
//!         CacheConfig::builder().prefix("api").build(),
//!     )?;
//!
//!     // Everything under `api/`
//!     let removed = registry.invalidate_all().await?;
//!     // Only keys outside the prefix that match the raw pattern
//!     let legacy = registry.invalidate("legacy:*", false).await?;
//!     println!("removed {} + {} keys", removed, legacy);
//!
//!     registry.close().await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod connection;
pub mod error;
pub mod store;

// Re-export main types for convenience
pub use cache::{
    BasicKeyBuilder, BincodeCodec, CacheArgs, CacheConfig, CacheConfigBuilder, CacheKey,
    CacheRegistry, CacheStats, CacheValue, CachedFn, CallArgs, CallContext, Codec,
    ContextStrippingKeyBuilder, HashFunction, JsonCodec, KeyBuilder, KeyPart, Sha256Hash,
    Sha512Hash,
};
pub use connection::{HealthCheckConfig, HealthCheckResult, HealthStatus};
pub use error::{CacheError, Result};
pub use store::{MemoryStore, RedisStore, Store};
