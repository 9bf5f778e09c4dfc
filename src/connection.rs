//! Store connectivity checks
//!
//! [`verify_connection`] backs `CacheRegistry::check_connection`: a timed
//! ping whose failures are classified into the crate's error taxonomy.
//! [`health_check_detailed`] never fails and reports a status suitable for
//! health endpoints.

use crate::error::{CacheError, Result};
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Configuration for health check behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckConfig {
    /// Timeout for a single ping
    pub timeout: Duration,
    /// Response time threshold for degraded state (in milliseconds)
    pub degraded_threshold_ms: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            degraded_threshold_ms: 250,
        }
    }
}

/// Health status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Store is healthy and responsive
    Healthy,
    /// Store is responsive but slow (above degraded threshold)
    Degraded,
    /// Store is not responsive or erroring
    Unhealthy,
}

impl HealthStatus {
    /// Convert to HTTP status code equivalent
    pub fn to_http_status_code(&self) -> u16 {
        match self {
            HealthStatus::Healthy => 200,
            HealthStatus::Degraded => 200,
            HealthStatus::Unhealthy => 503,
        }
    }

    /// Check if status is healthy or degraded (operational)
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

/// Detailed health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Overall health status
    pub status: HealthStatus,
    /// Response time in milliseconds
    pub response_time_ms: u64,
    /// Timestamp of the health check
    pub timestamp: DateTime<Utc>,
    /// Error message (if unhealthy)
    pub error: Option<String>,
}

impl HealthCheckResult {
    pub(crate) fn healthy(response_time: Duration, degraded_threshold_ms: u64) -> Self {
        let response_time_ms = response_time.as_millis() as u64;
        let status = if response_time_ms > degraded_threshold_ms {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self {
            status,
            response_time_ms,
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub(crate) fn unhealthy(response_time: Duration, error: &str) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            response_time_ms: response_time.as_millis() as u64,
            timestamp: Utc::now(),
            error: Some(error.to_string()),
        }
    }
}

async fn ping_with_timeout(store: &dyn Store, timeout: Duration) -> Result<bool> {
    match tokio::time::timeout(timeout, store.ping()).await {
        Ok(result) => result,
        Err(_) => Err(CacheError::TimeoutError {
            timeout_ms: timeout.as_millis() as u64,
            context: "store ping".to_string(),
        }),
    }
}

/// Ping the store once
///
/// # Returns
/// * `Ok(true)` if the store answered the ping
/// * `Err(CacheError::ConnectionError)` if it answered negatively, could not be
///   reached, or did not answer within the timeout
/// * `Err(CacheError::Other)` for any other failure, wrapped with context
pub async fn verify_connection(store: &dyn Store, config: &HealthCheckConfig) -> Result<bool> {
    debug!("Pinging store");

    match ping_with_timeout(store, config.timeout).await {
        Ok(true) => {
            debug!("Store ping passed");
            Ok(true)
        }
        Ok(false) => {
            warn!("Store failed to respond to PING");
            Err(CacheError::ConnectionError(
                "store failed to respond to PING".to_string(),
            ))
        }
        Err(e) if e.is_connection_error() => {
            warn!("Could not connect to store: {}", e);
            Err(CacheError::ConnectionError(format!(
                "could not connect to store: {}",
                e
            )))
        }
        Err(e) => {
            warn!("Unexpected error while pinging store: {}", e);
            Err(CacheError::Other(format!(
                "an unexpected error occurred while pinging store: {}",
                e
            )))
        }
    }
}

/// Ping the store and report status with timing
///
/// Always returns a `HealthCheckResult`, even on failure (status will be Unhealthy).
pub async fn health_check_detailed(store: &dyn Store, config: &HealthCheckConfig) -> HealthCheckResult {
    let start = Instant::now();

    match ping_with_timeout(store, config.timeout).await {
        Ok(true) => HealthCheckResult::healthy(start.elapsed(), config.degraded_threshold_ms),
        Ok(false) => HealthCheckResult::unhealthy(start.elapsed(), "store failed to respond to PING"),
        Err(e) => {
            warn!("Detailed health check failed: {}", e);
            HealthCheckResult::unhealthy(start.elapsed(), &e.to_string())
        }
    }
}
