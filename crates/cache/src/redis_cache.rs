//! Redis-backed cache for multi-instance deployments.
//!
//! Connections go through a [`ConnectionManager`], which reconnects
//! transparently and is cheap to clone per command.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::RwLock;

use crate::error::CacheError;
use crate::store::CacheStore;

/// Shared cache backend talking to a Redis server.
pub struct RedisCache {
    url: String,
    conn: RwLock<Option<ConnectionManager>>,
}

impl RedisCache {
    /// Create an unconnected cache for `url` (e.g. `redis://host:6379/0`).
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            conn: RwLock::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn conn(&self) -> Result<ConnectionManager, CacheError> {
        self.conn.read().await.clone().ok_or(CacheError::NotConnected)
    }
}

/// Convert a TTL to whole milliseconds for `PX`, never less than one.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl CacheStore for RedisCache {
    /// Open the connection and verify it with `PING`.
    async fn connect(&self) -> Result<(), CacheError> {
        let mut guard = self.conn.write().await;
        if guard.is_some() {
            return Ok(());
        }

        let client = redis::Client::open(self.url.as_str())?;
        let mut conn = ConnectionManager::new(client).await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        tracing::info!(url = %self.url, "Redis cache connected");
        *guard = Some(conn);
        Ok(())
    }

    async fn close(&self) -> Result<(), CacheError> {
        if self.conn.write().await.take().is_some() {
            tracing::info!(url = %self.url, "Redis cache closed");
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    /// `SET key value NX PX ttl`: a single atomic round-trip.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let mut conn = self.conn().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn().await?;
        let found: bool = conn.exists(key).await?;
        Ok(found)
    }

    async fn flush(&self) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn ttl_millis_rounds_up_to_one() {
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2000);
    }

    #[tokio::test]
    async fn operations_before_connect_fail() {
        let cache = RedisCache::new("redis://127.0.0.1:1/0");
        assert_matches!(cache.get("k").await, Err(CacheError::NotConnected));
        assert_matches!(
            cache.set_if_absent("k", "v", Duration::from_secs(1)).await,
            Err(CacheError::NotConnected)
        );
    }

    #[tokio::test]
    async fn close_without_connect_is_noop() {
        let cache = RedisCache::new("redis://127.0.0.1:1/0");
        assert!(cache.close().await.is_ok());
    }
}
