//! Error types for cache operations
//!
//! Every store-facing failure is surfaced to the caller through [`CacheError`].
//! Nothing in this crate retries or suppresses an error; a missing entry is the
//! normal miss path and never shows up here.

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// The registry has no store configured, or a configuration value is invalid
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Store unreachable, ping failed, or the transport raised a connectivity fault
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A computed value could not be encoded for storage
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A stored entry could not be decoded
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// Any other failure reported by the store during get/set/scan/delete
    #[error("Store operation error: {0}")]
    StoreOperationError(String),

    /// Operation timeout
    #[error("Operation timed out after {timeout_ms}ms: {context}")]
    TimeoutError { timeout_ms: u64, context: String },

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

impl CacheError {
    /// Whether the error indicates the store could not be reached
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            CacheError::ConnectionError(_) | CacheError::TimeoutError { .. }
        )
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Other(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Other(s.to_string())
    }
}
