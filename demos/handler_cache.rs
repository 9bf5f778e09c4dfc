//! Handler Cache Demo Application
//!
//! Caches a slow report handler in Redis, shows hits and misses, then
//! invalidates the handler's entries.
//!
//! Usage:
//!   cargo run --example handler_cache
//!
//! Environment variables (a `.env` file is honored):
//!   REDIS_URL              - Redis connection URL (default: redis://127.0.0.1:6379)
//!   CACHE_PREFIX           - key prefix (default: empty)
//!   CACHE_DEFAULT_TTL_SECS - default TTL, 0 for none (default: 10)
//!   RUST_LOG               - log filter (default: info)

use fingerprint_cache::{
    handler_identity, CacheConfig, CacheRegistry, CallContext, HealthStatus, RedisStore,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SalesReport {
    region: String,
    day: String,
    total_cents: u64,
}

/// Stand-in for per-request state that must not affect the cache key
struct RequestInfo {
    request_id: u64,
}

async fn sales_report(region: String, day: String, request: Arc<RequestInfo>) -> SalesReport {
    info!("Computing report for {} on {} (request {})", region, day, request.request_id);
    tokio::time::sleep(Duration::from_millis(500)).await;

    SalesReport {
        total_cents: (region.len() * 1_000 + day.len() * 10) as u64,
        region,
        day,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("=== Handler Cache Demo ===");

    let store = RedisStore::from_env().await?;
    let registry = Arc::new(CacheRegistry::with_store(Arc::new(store), CacheConfig::from_env()?)?);

    let health = registry.health_check_detailed().await;
    if health.status != HealthStatus::Healthy {
        warn!("Store health: {:?} ({}ms)", health.status, health.response_time_ms);
    }
    registry.check_connection().await?;

    let report = registry
        .cached(
            handler_identity!(sales_report),
            |(region, day, request): (String, String, CallContext<Arc<RequestInfo>>)| {
                sales_report(region, day, request.into_inner())
            },
        )
        .with_ttl(Duration::from_secs(60));

    for request_id in 0..3 {
        let started = Instant::now();
        let result = report
            .call((
                "emea".to_string(),
                "2024-06-01".to_string(),
                CallContext(Arc::new(RequestInfo { request_id })),
            ))
            .await?;

        info!(
            "Request {}: {:?} in {:?}",
            request_id,
            result,
            started.elapsed()
        );
    }

    info!("Stats: {}", registry.stats());

    let keys = registry.list_all_keys().await?;
    info!("{} keys under the prefix", keys.len());

    let removed = report.invalidate().await?;
    info!("Invalidated {} entries for {}", removed, report.handler());

    registry.close().await?;
    Ok(())
}
