use std::fmt;
use std::str::FromStr;

use spv_core::env;
use spv_core::ConfigError;

const DEFAULT_REDIS_URL: &str = "redis://localhost:6379/0";
const DEFAULT_PREFIX: &str = "bsv_";

/// Cluster coordinator backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coordinator {
    /// In-process stub for a single instance.
    Memory,
    /// Shared Redis store for a fleet of instances.
    Redis,
}

impl FromStr for Coordinator {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" | "remote" => Ok(Self::Redis),
            other => Err(ConfigError::Unsupported {
                kind: "cluster coordinator",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::Redis => f.write_str("redis"),
        }
    }
}

/// Cluster settings.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub coordinator: Coordinator,
    /// Shared-store address, only used by [`Coordinator::Redis`].
    pub redis_url: String,
    /// Prefix applied to lock keys and pub/sub channel names.
    pub prefix: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            coordinator: Coordinator::Memory,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl ClusterConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable                          | Default                    |
    /// |-----------------------------------|----------------------------|
    /// | `SPVWALLET_CLUSTER__COORDINATOR`  | `memory`                   |
    /// | `SPVWALLET_CLUSTER__REDIS_URL`    | `redis://localhost:6379/0` |
    /// | `SPVWALLET_CLUSTER__PREFIX`       | `bsv_`                     |
    pub fn from_env() -> Result<Self, ConfigError> {
        let coordinator = env::string_or("SPVWALLET_CLUSTER__COORDINATOR", "memory").parse()?;
        Ok(Self {
            coordinator,
            redis_url: env::string_or("SPVWALLET_CLUSTER__REDIS_URL", DEFAULT_REDIS_URL),
            prefix: env::string_or("SPVWALLET_CLUSTER__PREFIX", DEFAULT_PREFIX),
        })
    }

    /// Shorthand for a remote coordinator at `redis_url`.
    pub fn redis(redis_url: impl Into<String>) -> Self {
        Self {
            coordinator: Coordinator::Redis,
            redis_url: redis_url.into(),
            ..Self::default()
        }
    }
}
