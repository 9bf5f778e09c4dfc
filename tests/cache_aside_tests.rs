//! Integration tests for cache-aside execution
//!
//! These tests verify:
//! - Values survive the store round trip unchanged
//! - The computation runs once per key while the entry is live
//! - TTL defaults, overrides and persistent entries
//! - Store and decode failures surface to the caller
//! - Registry lifecycle and connection checks
//! - Slow health checks do not hold up other registry calls

use async_trait::async_trait;
use fingerprint_cache::cache::CacheArgs;
use fingerprint_cache::store::MemoryStore;
use fingerprint_cache::{
    handler_identity, CacheConfig, CacheError, CacheKey, CacheRegistry, CallArgs, CallContext,
    HealthCheckConfig, HealthStatus, JsonCodec, Result, Store,
};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Report {
    id: u64,
    title: String,
    scores: Vec<f64>,
    tags: BTreeMap<String, Option<i32>>,
}

fn sample_report() -> Report {
    let mut tags = BTreeMap::new();
    tags.insert("priority".to_string(), Some(3));
    tags.insert("owner".to_string(), None);

    Report {
        id: 17,
        title: "Quarterly – ünïcode".to_string(),
        scores: vec![0.5, -1.25, 1e9],
        tags,
    }
}

fn not_called<T>() -> T {
    panic!("computation must not run on a cache hit")
}

fn registry_with(store: Arc<dyn Store>, config: CacheConfig) -> Arc<CacheRegistry> {
    Arc::new(CacheRegistry::with_store(store, config).unwrap())
}

fn memory_registry(store: &MemoryStore, prefix: &str) -> Arc<CacheRegistry> {
    registry_with(
        Arc::new(store.clone()),
        CacheConfig::builder().prefix(prefix).build(),
    )
}

/// Store wrapper logging every call
#[derive(Clone, Default)]
struct RecordingStore {
    inner: MemoryStore,
    calls: Arc<Mutex<Vec<String>>>,
    ttls: Arc<Mutex<Vec<Option<Duration>>>>,
}

impl RecordingStore {
    fn record(&self, op: &str) {
        self.calls.lock().unwrap().push(op.to_string());
    }

    fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

#[async_trait]
impl Store for RecordingStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        self.record("exists");
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.record("get");
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.record("set");
        self.ttls.lock().unwrap().push(ttl);
        self.inner.set(key, value, ttl).await
    }

    fn scan<'a>(&'a self, pattern: &'a str) -> BoxStream<'a, Result<CacheKey>> {
        self.record("scan");
        self.inner.scan(pattern)
    }

    async fn delete_many(&self, keys: &[CacheKey]) -> Result<usize> {
        self.record("delete_many");
        self.inner.delete_many(keys).await
    }

    async fn ping(&self) -> Result<bool> {
        self.record("ping");
        self.inner.ping().await
    }
}

#[derive(Clone, Copy)]
enum Failure {
    Unreachable,
    WriteRejected,
    PingFalse,
    PingHangs,
    Unexpected,
}

/// Store failing in a configurable way
struct FailingStore {
    failure: Failure,
}

#[async_trait]
impl Store for FailingStore {
    async fn exists(&self, _key: &str) -> Result<bool> {
        match self.failure {
            Failure::Unreachable => Err(CacheError::ConnectionError("connection refused".into())),
            _ => Ok(false),
        }
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> Result<()> {
        Err(CacheError::StoreOperationError("OOM command not allowed".into()))
    }

    fn scan<'a>(&'a self, _pattern: &'a str) -> BoxStream<'a, Result<CacheKey>> {
        Box::pin(futures::stream::empty())
    }

    async fn delete_many(&self, _keys: &[CacheKey]) -> Result<usize> {
        Ok(0)
    }

    async fn ping(&self) -> Result<bool> {
        match self.failure {
            Failure::Unreachable => Err(CacheError::ConnectionError("connection refused".into())),
            Failure::WriteRejected => Ok(true),
            Failure::PingFalse => Ok(false),
            Failure::PingHangs => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(true)
            }
            Failure::Unexpected => Err(CacheError::StoreOperationError("WRONGTYPE".into())),
        }
    }
}

#[tokio::test]
async fn test_round_trip_preserves_value() {
    let store = MemoryStore::new();
    let registry = memory_registry(&store, "rt");
    let args = CallArgs::new().arg(&17u64);

    let computed: Report = registry
        .run("reports::get", &args, None, || async { sample_report() })
        .await
        .unwrap();
    let cached: Report = registry
        .run("reports::get", &args, None, || async { not_called::<Report>() })
        .await
        .unwrap();

    assert_eq!(computed, sample_report());
    assert_eq!(cached, computed);
}

#[tokio::test]
async fn test_round_trip_with_json_codec() {
    let store = MemoryStore::new();
    let registry = Arc::new(
        CacheRegistry::<JsonCodec>::with_store(
            Arc::new(store.clone()),
            CacheConfig::builder().prefix("json").codec(JsonCodec).build(),
        )
        .unwrap(),
    );
    let args = CallArgs::new();

    let _: Report = registry.run("h", &args, None, || async { sample_report() }).await.unwrap();

    let key = registry.key_for("h", &args).await.unwrap();
    let raw = store.get(&key).await.unwrap().unwrap();
    assert!(String::from_utf8(raw).unwrap().contains("\"title\""));

    let cached: Report = registry
        .run("h", &args, None, || async { not_called::<Report>() })
        .await
        .unwrap();
    assert_eq!(cached, sample_report());
}

#[tokio::test]
async fn test_computation_runs_once_per_key() {
    let store = MemoryStore::new();
    let registry = memory_registry(&store, "once");
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    let lookup = registry.cached(handler_identity!(lookup), move |(id,): (u32,)| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            format!("user-{}", id)
        }
    });

    assert_eq!(lookup.call((1,)).await.unwrap(), "user-1");
    assert_eq!(lookup.call((1,)).await.unwrap(), "user-1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(lookup.call((2,)).await.unwrap(), "user-2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let stats = registry.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.stores, 2);
}

#[tokio::test]
async fn test_context_arguments_share_an_entry() {
    let store = MemoryStore::new();
    let registry = memory_registry(&store, "ctx");
    let calls = AtomicUsize::new(0);

    for request_id in 0..3u32 {
        let args = CallArgs::new()
            .named("page", &1)
            .named("request", &CallContext(request_id))
            .named("__trace", &format!("trace-{}", request_id));

        let page: Vec<u32> = registry
            .run("items::page", &args, None, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                vec![1, 2, 3]
            })
            .await
            .unwrap();
        assert_eq!(page, vec![1, 2, 3]);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(registry.list_all_keys().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_operation_order_on_miss_and_hit() {
    let store = RecordingStore::default();
    let registry = registry_with(Arc::new(store.clone()), CacheConfig::builder().build());
    let args = ("a".to_string(), 1u8).call_args();

    let _: u8 = registry.run("h", &args, None, || async { 1 }).await.unwrap();
    assert_eq!(store.take_calls(), vec!["exists", "set"]);

    let _: u8 = registry.run("h", &args, None, || async { 1 }).await.unwrap();
    assert_eq!(store.take_calls(), vec!["exists", "get"]);
}

#[tokio::test]
async fn test_ttl_default_override_and_persistent() {
    let store = RecordingStore::default();
    let registry = registry_with(
        Arc::new(store.clone()),
        CacheConfig::builder().default_ttl(Duration::from_secs(30)).build(),
    );

    let _: u8 = registry.run("h", &CallArgs::new().arg(&1), None, || async { 0 }).await.unwrap();
    let _: u8 = registry
        .run("h", &CallArgs::new().arg(&2), Some(Duration::from_secs(5)), || async { 0 })
        .await
        .unwrap();
    let _: u8 = registry
        .run("h", &CallArgs::new().arg(&3), Some(Duration::ZERO), || async { 0 })
        .await
        .unwrap();

    let persistent = registry_with(
        Arc::new(store.clone()),
        CacheConfig::builder().no_expiration().build(),
    );
    let _: u8 = persistent.run("h", &CallArgs::new().arg(&4), None, || async { 0 }).await.unwrap();

    assert_eq!(
        *store.ttls.lock().unwrap(),
        vec![
            Some(Duration::from_secs(30)),
            Some(Duration::from_secs(5)),
            None,
            None
        ]
    );
}

#[tokio::test]
async fn test_entries_expire() {
    let store = MemoryStore::new();
    let registry = registry_with(
        Arc::new(store.clone()),
        CacheConfig::builder().default_ttl(Duration::from_millis(100)).build(),
    );
    let calls = AtomicUsize::new(0);
    let args = CallArgs::new().arg("k");

    let compute = || async {
        calls.fetch_add(1, Ordering::SeqCst);
        "v".to_string()
    };

    let _: String = registry.run("h", &args, None, compute).await.unwrap();
    let _: String = registry.run("h", &args, None, compute).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;

    let _: String = registry.run("h", &args, None, compute).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_concurrent_misses_each_compute() {
    let store = MemoryStore::new();
    let registry = memory_registry(&store, "race");
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(tokio::sync::Barrier::new(2));

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let calls = Arc::clone(&calls);
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                registry
                    .run("slow", &CallArgs::new(), None, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        // Both invocations are past their existence check here
                        gate.wait().await;
                        42u32
                    })
                    .await
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 42);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(registry.list_all_keys().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_decode_failure_is_not_recomputed() {
    let store = MemoryStore::new();
    let registry = memory_registry(&store, "corrupt");
    let args = CallArgs::new().arg(&1);

    let key = registry.key_for("h", &args).await.unwrap();
    store.set(&key, b"not bincode".to_vec(), None).await.unwrap();

    let result: Result<u64> = registry.run("h", &args, None, || async { 1 }).await;
    assert!(matches!(result, Err(CacheError::DeserializationError(_))));

    // The corrupt entry is left in place
    assert!(store.exists(&key).await.unwrap());
}

#[tokio::test]
async fn test_store_failures_propagate() {
    let unreachable = registry_with(
        Arc::new(FailingStore { failure: Failure::Unreachable }),
        CacheConfig::builder().build(),
    );
    let calls = AtomicUsize::new(0);
    let result: Result<u8> = unreachable
        .run("h", &CallArgs::new(), None, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            1
        })
        .await;
    assert!(matches!(result, Err(CacheError::ConnectionError(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let rejecting = registry_with(
        Arc::new(FailingStore { failure: Failure::WriteRejected }),
        CacheConfig::builder().build(),
    );
    let result: Result<u8> = rejecting.run("h", &CallArgs::new(), None, || async { 1 }).await;
    assert!(matches!(result, Err(CacheError::StoreOperationError(_))));
}

#[tokio::test]
async fn test_try_call_maps_cache_errors_into_caller_errors() {
    #[derive(Debug)]
    enum AppError {
        Cache(CacheError),
        NotFound,
    }

    impl From<CacheError> for AppError {
        fn from(e: CacheError) -> Self {
            AppError::Cache(e)
        }
    }

    let store = MemoryStore::new();
    let registry = memory_registry(&store, "app");
    let find = registry.cached("users::find", |(id,): (u32,)| async move {
        if id == 0 {
            Err(AppError::NotFound)
        } else {
            Ok(format!("user-{}", id))
        }
    });

    assert!(matches!(find.try_call((0,)).await, Err(AppError::NotFound)));
    assert_eq!(find.try_call((5,)).await.unwrap(), "user-5");
    assert_eq!(registry.list_all_keys().await.unwrap().len(), 1);

    registry.close().await.unwrap();
    assert!(matches!(
        find.try_call((5,)).await,
        Err(AppError::Cache(CacheError::ConfigurationError(_)))
    ));
}

#[tokio::test]
async fn test_unconfigured_registry_rejects_operations() {
    let registry = Arc::new(CacheRegistry::new());

    let result: Result<u8> = registry.run("h", &CallArgs::new(), None, || async { 1 }).await;
    assert!(matches!(result, Err(CacheError::ConfigurationError(_))));
    assert_err!(registry.invalidate_all().await);
    assert_err!(registry.list_all_keys().await);
    assert!(matches!(
        registry.check_connection().await,
        Err(CacheError::ConnectionError(_))
    ));

    let report = registry.health_check_detailed().await;
    assert_eq!(report.status, HealthStatus::Unhealthy);

    assert_ok!(
        registry
            .initialize(Arc::new(MemoryStore::new()), CacheConfig::builder().build())
            .await
    );
    let value: u8 = registry.run("h", &CallArgs::new(), None, || async { 1 }).await.unwrap();
    assert_eq!(value, 1);
}

#[tokio::test]
async fn test_check_connection_outcomes() {
    let registry = |failure| {
        registry_with(
            Arc::new(FailingStore { failure }),
            CacheConfig::builder()
                .health(HealthCheckConfig {
                    timeout: Duration::from_millis(50),
                    degraded_threshold_ms: 1000,
                })
                .build(),
        )
    };

    assert!(registry(Failure::WriteRejected).check_connection().await.unwrap());

    for failure in [Failure::Unreachable, Failure::PingFalse, Failure::PingHangs] {
        assert!(matches!(
            registry(failure).check_connection().await,
            Err(CacheError::ConnectionError(_))
        ));
    }

    match registry(Failure::Unexpected).check_connection().await {
        Err(CacheError::Other(message)) => assert!(message.contains("WRONGTYPE")),
        other => panic!("expected wrapped error, got {:?}", other),
    }

    let report = registry(Failure::PingHangs).health_check_detailed().await;
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert!(report.error.is_some());
}

#[tokio::test]
async fn test_reinitialize_switches_store() {
    let first = MemoryStore::new();
    let second = MemoryStore::new();
    let registry = memory_registry(&first, "switch");

    let _: u8 = registry.run("h", &CallArgs::new(), None, || async { 1 }).await.unwrap();
    registry
        .initialize(
            Arc::new(second.clone()),
            CacheConfig::builder().prefix("switch").build(),
        )
        .await
        .unwrap();
    let _: u8 = registry.run("h", &CallArgs::new(), None, || async { 2 }).await.unwrap();

    assert_eq!(first.len().await, 1);
    assert_eq!(second.len().await, 1);
    // The previous store is not closed by re-initialization
    assert!(!first.is_closed());
}

/// Working store whose ping never answers in time
struct SlowPingStore {
    inner: MemoryStore,
}

#[async_trait]
impl Store for SlowPingStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.inner.set(key, value, ttl).await
    }

    fn scan<'a>(&'a self, pattern: &'a str) -> BoxStream<'a, Result<CacheKey>> {
        self.inner.scan(pattern)
    }

    async fn delete_many(&self, keys: &[CacheKey]) -> Result<usize> {
        self.inner.delete_many(keys).await
    }

    async fn ping(&self) -> Result<bool> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        self.inner.ping().await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}

#[tokio::test]
async fn test_pending_health_check_does_not_block_other_calls() {
    let slow = MemoryStore::new();
    let replacement = MemoryStore::new();
    let config = || {
        CacheConfig::builder()
            .prefix("health")
            .health(HealthCheckConfig {
                timeout: Duration::from_secs(1),
                degraded_threshold_ms: 1000,
            })
            .build()
    };
    let registry = registry_with(Arc::new(SlowPingStore { inner: slow.clone() }), config());

    let health = tokio::spawn({
        let registry = registry.clone();
        async move { registry.health_check_detailed().await }
    });
    // Give the health check time to start its ping
    tokio::time::sleep(Duration::from_millis(50)).await;

    let args = CallArgs::new();
    let limit = Duration::from_millis(300);
    let (switched, value) = tokio::join!(
        tokio::time::timeout(
            limit,
            registry.initialize(Arc::new(replacement.clone()), config())
        ),
        tokio::time::timeout(
            limit,
            registry.run("h", &args, None, || async { 7u8 })
        ),
    );
    assert_ok!(switched.expect("initialize waited for the health check"));
    assert_eq!(value.expect("run waited for the health check").unwrap(), 7);

    let closed = tokio::time::timeout(limit, registry.close()).await;
    assert_ok!(closed.expect("close waited for the health check"));
    assert!(replacement.is_closed());
    assert!(!slow.is_closed());

    // The check finishes against the store it started with
    let report = health.await.unwrap();
    assert_eq!(report.status, HealthStatus::Unhealthy);
}
