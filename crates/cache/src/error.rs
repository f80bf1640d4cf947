/// Error type for cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An operation was attempted before `connect()` or after `close()`.
    #[error("Cache not connected, call connect() first")]
    NotConnected,

    /// The Redis server rejected a command or could not be reached.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}
