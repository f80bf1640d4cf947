//! Factory and lifecycle wrapper for the cluster backends.

use std::sync::Arc;
use std::time::Duration;

use spv_cache::{CacheStore, RedisCache};
use tokio::sync::RwLock;

use crate::config::{ClusterConfig, Coordinator};
use crate::error::ClusterError;
use crate::pubsub::{MemoryPubSub, PubSubService, RedisPubSub};

/// Backends held between `connect()` and `close()`.
struct Connection {
    /// Shared lock store; `None` for the memory coordinator.
    lock_store: Option<Arc<dyn CacheStore>>,
    /// Constructed on first call to [`ClusterClient::pubsub`].
    pubsub: Option<Arc<dyn PubSubService>>,
}

/// Cluster coordinator handle, shared by the scheduler and job handlers.
///
/// Locks are leases: a key written with a TTL and never renewed. Ownership
/// is not tracked; the stored value is this instance's id for operators
/// inspecting the store.
pub struct ClusterClient {
    config: ClusterConfig,
    instance_id: String,
    lock_store_override: Option<Arc<dyn CacheStore>>,
    state: RwLock<Option<Connection>>,
}

impl ClusterClient {
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            config,
            instance_id: uuid::Uuid::new_v4().to_string(),
            lock_store_override: None,
            state: RwLock::new(None),
        }
    }

    /// Use `store` for locks instead of a Redis connection built from the
    /// config. Only consulted by the [`Coordinator::Redis`] backend, and
    /// left open by [`close`](Self::close).
    pub fn with_lock_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.lock_store_override = Some(store);
        self
    }

    pub fn coordinator(&self) -> Coordinator {
        self.config.coordinator
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.is_some()
    }

    /// Construct the backends selected by the configuration.
    ///
    /// For the Redis coordinator an invalid URL is reported here; an
    /// unreachable server is not, since the store is dialled on first use.
    pub async fn connect(&self) -> Result<(), ClusterError> {
        let mut state = self.state.write().await;
        if state.is_some() {
            return Ok(());
        }

        let lock_store = match self.config.coordinator {
            Coordinator::Memory => {
                tracing::info!("Cluster using in-memory coordinator");
                None
            }
            Coordinator::Redis => {
                let store = match &self.lock_store_override {
                    Some(store) => Arc::clone(store),
                    None => {
                        redis::Client::open(self.config.redis_url.as_str())?;
                        Arc::new(RedisCache::new(self.config.redis_url.clone())) as Arc<dyn CacheStore>
                    }
                };
                tracing::info!(
                    url = %self.config.redis_url,
                    prefix = %self.config.prefix,
                    instance_id = %self.instance_id,
                    "Cluster using Redis coordinator",
                );
                Some(store)
            }
        };

        *state = Some(Connection {
            lock_store,
            pubsub: None,
        });
        Ok(())
    }

    /// Close the pub/sub backend and the lock store connection.
    pub async fn close(&self) -> Result<(), ClusterError> {
        let Some(conn) = self.state.write().await.take() else {
            return Ok(());
        };
        if let Some(pubsub) = conn.pubsub {
            pubsub.close().await?;
        }
        // An injected store belongs to the caller and stays open.
        if let (Some(store), None) = (conn.lock_store, &self.lock_store_override) {
            store.close().await?;
        }
        tracing::info!(coordinator = %self.config.coordinator, "Cluster client closed");
        Ok(())
    }

    /// Return the pub/sub backend, constructing it on first use.
    pub async fn pubsub(&self) -> Result<Arc<dyn PubSubService>, ClusterError> {
        if let Some(conn) = self.state.read().await.as_ref() {
            if let Some(pubsub) = &conn.pubsub {
                return Ok(Arc::clone(pubsub));
            }
        }

        let mut state = self.state.write().await;
        let conn = state.as_mut().ok_or(ClusterError::NotConnected)?;
        if let Some(pubsub) = &conn.pubsub {
            return Ok(Arc::clone(pubsub));
        }

        let pubsub: Arc<dyn PubSubService> = match self.config.coordinator {
            Coordinator::Memory => Arc::new(MemoryPubSub::new()),
            Coordinator::Redis => Arc::new(RedisPubSub::new(
                &self.config.redis_url,
                self.config.prefix.clone(),
            )?),
        };
        conn.pubsub = Some(Arc::clone(&pubsub));
        Ok(pubsub)
    }

    /// Try to take the cluster-wide lease on `key` for `ttl`.
    ///
    /// The memory coordinator always succeeds. The Redis coordinator issues
    /// a single atomic set-if-absent; any store failure is reported as
    /// "not acquired" so the caller skips the protected work.
    pub async fn try_lock(&self, key: &str, ttl: Duration) -> bool {
        if self.config.coordinator == Coordinator::Memory {
            return true;
        }

        let store = match self.state.read().await.as_ref() {
            Some(conn) => conn.lock_store.clone(),
            None => None,
        };
        let Some(store) = store else {
            tracing::warn!(key, "Cluster client not connected, lock not acquired");
            return false;
        };

        let lock_key = self.lock_key(key);
        let acquired = match store.connect().await {
            Ok(()) => store.set_if_absent(&lock_key, &self.instance_id, ttl).await,
            Err(e) => Err(e),
        };

        match acquired {
            Ok(acquired) => {
                tracing::debug!(key = %lock_key, acquired, "Cluster lock attempt");
                acquired
            }
            Err(e) => {
                tracing::warn!(key = %lock_key, error = %e, "Lock store unavailable, lock not acquired");
                false
            }
        }
    }

    fn lock_key(&self, key: &str) -> String {
        format!("{}lock:{}", self.config.prefix, key)
    }
}
