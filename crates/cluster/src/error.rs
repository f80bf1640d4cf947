/// Error type for cluster coordination.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// `pubsub()` or a lock was requested before `connect()`.
    #[error("Cluster client not connected")]
    NotConnected,

    /// The shared store rejected a command, could not be reached, or the
    /// configured URL is invalid.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The lock-backing store failed.
    #[error("Lock store error: {0}")]
    LockStore(#[from] spv_cache::CacheError),
}
