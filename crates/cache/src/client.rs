//! Cache client that delegates to the backend named in [`CacheConfig`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::{CacheConfig, CacheEngine};
use crate::error::CacheError;
use crate::memory::MemoryCache;
use crate::redis_cache::RedisCache;
use crate::store::CacheStore;

#[derive(Clone)]
enum Backend {
    Memory(Arc<MemoryCache>),
    Redis(Arc<RedisCache>),
}

impl Backend {
    fn store(&self) -> Arc<dyn CacheStore> {
        match self {
            Self::Memory(cache) => Arc::clone(cache) as Arc<dyn CacheStore>,
            Self::Redis(cache) => Arc::clone(cache) as Arc<dyn CacheStore>,
        }
    }
}

/// Cache handle owned by the engine.
///
/// Every [`CacheStore`] operation fails with [`CacheError::NotConnected`]
/// until [`connect`](CacheStore::connect) has succeeded.
pub struct CacheClient {
    config: CacheConfig,
    backend: RwLock<Option<Backend>>,
}

impl CacheClient {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            backend: RwLock::new(None),
        }
    }

    pub fn engine(&self) -> CacheEngine {
        self.config.engine
    }

    pub async fn is_connected(&self) -> bool {
        self.backend.read().await.is_some()
    }

    /// Sweep expired entries from the in-memory backend.
    ///
    /// Redis expires keys on its own, so this returns `Ok(0)` there.
    pub async fn purge_expired(&self) -> Result<usize, CacheError> {
        match self.backend.read().await.as_ref() {
            Some(Backend::Memory(cache)) => Ok(cache.purge_expired()),
            Some(Backend::Redis(_)) => Ok(0),
            None => Err(CacheError::NotConnected),
        }
    }

    async fn store(&self) -> Result<Arc<dyn CacheStore>, CacheError> {
        self.backend
            .read()
            .await
            .as_ref()
            .map(Backend::store)
            .ok_or(CacheError::NotConnected)
    }
}

#[async_trait]
impl CacheStore for CacheClient {
    async fn connect(&self) -> Result<(), CacheError> {
        let mut guard = self.backend.write().await;
        if guard.is_some() {
            return Ok(());
        }

        let backend = match self.config.engine {
            CacheEngine::Memory => Backend::Memory(Arc::new(MemoryCache::new(self.config.max_keys))),
            CacheEngine::Redis => Backend::Redis(Arc::new(RedisCache::new(self.config.url.clone()))),
        };
        backend.store().connect().await?;

        tracing::info!(engine = %self.config.engine, "Cache connected");
        *guard = Some(backend);
        Ok(())
    }

    async fn close(&self) -> Result<(), CacheError> {
        let backend = self.backend.write().await.take();
        if let Some(backend) = backend {
            backend.store().close().await?;
            tracing::info!(engine = %self.config.engine, "Cache closed");
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.store().await?.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.store().await?.set(key, value, ttl).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        self.store().await?.set_if_absent(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store().await?.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.store().await?.exists(key).await
    }

    async fn flush(&self) -> Result<(), CacheError> {
        self.store().await?.flush().await
    }
}
