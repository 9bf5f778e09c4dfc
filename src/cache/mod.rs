//! # Cache-Aside Layer
//!
//! Results of async handlers are stored in a key-value [`Store`](crate::store::Store)
//! under a key fingerprinting the handler identity and its arguments.
//!
//! ## Components
//!
//! - **Key building**: [`KeyBuilder`] strategies over canonical argument
//!   renderings ([`KeyPart`]), digested by a [`HashFunction`]
//! - **Serialization**: pluggable [`Codec`] (bincode by default, JSON available)
//! - **Registry**: [`CacheRegistry`] holding the store and configuration
//! - **Execution**: [`CacheRegistry::run`] and [`CachedFn`] for cache-aside calls
//! - **Invalidation**: glob-pattern sweeps over the key space
//!
//! ## Key Layout
//!
//! ```text
//! {prefix}/{handler identity}:{hex digest of namespace token + arguments}
//! ```
//!
//! ## Example
//!
//! ```rust
//! use fingerprint_cache::cache::{CacheConfig, CacheRegistry, CallArgs};
//! use fingerprint_cache::store::MemoryStore;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = CacheConfig::builder()
//!     .prefix("reports")
//!     .default_ttl(Duration::from_secs(60))
//!     .build();
//!
//! let registry = CacheRegistry::with_store(Arc::new(MemoryStore::new()), config)?;
//!
//! let args = CallArgs::new().arg(&42u64).named("region", "eu");
//! let total: u64 = registry
//!     .run("reports::total", &args, None, || async { 1_000 })
//!     .await?;
//!
//! assert_eq!(total, 1_000);
//! registry.invalidate("reports::total:*", true).await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod executor;
pub mod hash;
pub mod invalidation;
pub mod key;
pub mod registry;
pub mod types;

pub use codec::{BincodeCodec, Codec, JsonCodec};
pub use config::{CacheConfig, CacheConfigBuilder};
pub use executor::CachedFn;
pub use hash::{HashFunction, Sha256Hash, Sha512Hash};
pub use key::{
    key_repr, BasicKeyBuilder, CacheArgs, CallArgs, CallContext, ContextFilter,
    ContextStrippingKeyBuilder, KeyBuilder, KeyContext, KeyPart, NamedArg, ReservedNameFilter,
    RESERVED_CONTEXT_PREFIX,
};
pub use registry::{CacheRegistry, RegistrySettings};
pub use types::{CacheKey, CacheStats, CacheValue};
