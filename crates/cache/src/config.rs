use std::fmt;
use std::str::FromStr;

use spv_core::env;
use spv_core::ConfigError;

/// Default Redis URL for the cache backend.
const DEFAULT_URL: &str = "redis://localhost:6379/0";

/// Default LRU capacity of the in-memory backend.
pub const DEFAULT_MAX_KEYS: usize = 10_000;

/// Supported cache backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEngine {
    Memory,
    Redis,
}

impl FromStr for CacheEngine {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "freecache" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(ConfigError::Unsupported {
                kind: "cache engine",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for CacheEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::Redis => f.write_str("redis"),
        }
    }
}

/// Cache settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub engine: CacheEngine,
    /// Redis URL, only used by [`CacheEngine::Redis`].
    pub url: String,
    /// Capacity of the in-memory backend before LRU eviction kicks in.
    pub max_keys: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            engine: CacheEngine::Memory,
            url: DEFAULT_URL.to_string(),
            max_keys: DEFAULT_MAX_KEYS,
        }
    }
}

impl CacheConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable                    | Default                    |
    /// |-----------------------------|----------------------------|
    /// | `SPVWALLET_CACHE__ENGINE`   | `memory`                   |
    /// | `SPVWALLET_CACHE__URL`      | `redis://localhost:6379/0` |
    /// | `SPVWALLET_CACHE__MAX_KEYS` | `10000`                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        let engine = env::string_or("SPVWALLET_CACHE__ENGINE", "memory").parse()?;
        Ok(Self {
            engine,
            url: env::string_or("SPVWALLET_CACHE__URL", DEFAULT_URL),
            max_keys: env::parse_or("SPVWALLET_CACHE__MAX_KEYS", DEFAULT_MAX_KEYS)?,
        })
    }
}
