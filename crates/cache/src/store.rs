use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheError;

/// Contract shared by every cache backend.
///
/// Values are strings; callers serialize structured data themselves. A
/// `ttl` of `None` stores the key without expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Establish the underlying connection. No-op for in-memory stores.
    async fn connect(&self) -> Result<(), CacheError>;

    /// Release the connection. Idempotent.
    async fn close(&self) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Atomically store `value` under `key` only if no live value exists.
    ///
    /// Returns `true` when the value was written. This is the primitive
    /// behind cluster-wide locks, so implementations must not split the
    /// check and the write across two round-trips.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove every key. Intended for development and tests.
    async fn flush(&self) -> Result<(), CacheError>;
}
