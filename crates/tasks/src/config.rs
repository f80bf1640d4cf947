use std::time::Duration;

use spv_core::env;
use spv_core::ConfigError;

/// Task scheduler settings.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    /// When `false` the engine never starts the scheduler.
    pub enabled: bool,
    /// Lease TTL used when wrapping jobs with a cluster lock.
    pub lock_ttl: Duration,
    /// Period of the built-in memory cache sweep.
    pub cache_sweep_period: Duration,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lock_ttl: Duration::from_secs(60),
            cache_sweep_period: Duration::from_secs(60),
        }
    }
}

impl TaskConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable                           | Default |
    /// |------------------------------------|---------|
    /// | `SPVWALLET_TASK__ENABLED`          | `true`  |
    /// | `SPVWALLET_TASK__LOCK_TTL_SECS`    | `60`    |
    /// | `SPVWALLET_TASK__CACHE_SWEEP_SECS` | `60`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        let sweep_secs: u64 = env::parse_or("SPVWALLET_TASK__CACHE_SWEEP_SECS", 60)?;
        if sweep_secs == 0 {
            return Err(ConfigError::InvalidValue {
                var: "SPVWALLET_TASK__CACHE_SWEEP_SECS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            enabled: env::bool_or("SPVWALLET_TASK__ENABLED", true)?,
            lock_ttl: Duration::from_secs(env::parse_or("SPVWALLET_TASK__LOCK_TTL_SECS", 60)?),
            cache_sweep_period: Duration::from_secs(sweep_secs),
        })
    }
}
