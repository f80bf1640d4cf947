//! Key-value cache used both as a general cache and as the backing store
//! for cluster locks.
//!
//! - [`CacheStore`]: the backend contract, including the atomic
//!   [`set_if_absent`](CacheStore::set_if_absent) primitive locks rely on.
//! - [`MemoryCache`]: single-instance store with per-key TTL and LRU
//!   eviction.
//! - [`RedisCache`]: shared store for multi-instance deployments.
//! - [`CacheClient`]: selects a backend from [`CacheConfig`].

pub mod client;
pub mod config;
pub mod error;
pub mod memory;
pub mod redis_cache;
pub mod store;

pub use client::CacheClient;
pub use config::{CacheConfig, CacheEngine};
pub use error::CacheError;
pub use memory::MemoryCache;
pub use redis_cache::RedisCache;
pub use store::CacheStore;
