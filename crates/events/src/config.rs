use std::time::Duration;

use spv_core::env;
use spv_core::ConfigError;

use crate::delivery::webhook::DeliveryPolicy;

/// Default capacity of the bus ingress queue and of each webhook queue.
pub const DEFAULT_BUFFER_SIZE: usize = 100;

/// Upper bound for the backoff between delivery attempts.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Notification and webhook delivery settings.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    /// When `false` the engine builds no bus and no webhook manager.
    pub enabled: bool,
    /// Capacity of the ingress queue and of each per-webhook queue.
    pub buffer_size: usize,
    /// Total delivery attempts per event before the webhook is banned.
    pub webhook_max_retries: u32,
    pub webhook_ban_time: Duration,
    /// Delay before the second attempt; doubles on every further attempt.
    pub webhook_retry_delay: Duration,
    /// Timeout of a single HTTP request.
    pub webhook_timeout: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
            webhook_max_retries: 3,
            webhook_ban_time: Duration::from_secs(3600),
            webhook_retry_delay: Duration::from_millis(1000),
            webhook_timeout: Duration::from_secs(10),
        }
    }
}

impl NotificationConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable                                     | Default |
    /// |----------------------------------------------|---------|
    /// | `SPVWALLET_NOTIFICATIONS__ENABLED`           | `true`  |
    /// | `SPVWALLET_NOTIFICATIONS__BUFFER_SIZE`       | `100`   |
    /// | `SPVWALLET_NOTIFICATIONS__WEBHOOK_MAX_RETRIES` | `3`   |
    /// | `SPVWALLET_NOTIFICATIONS__WEBHOOK_BAN_SECS`  | `3600`  |
    /// | `SPVWALLET_NOTIFICATIONS__WEBHOOK_RETRY_DELAY_MS` | `1000` |
    /// | `SPVWALLET_NOTIFICATIONS__WEBHOOK_TIMEOUT_SECS` | `10` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let buffer_size: usize =
            env::parse_or("SPVWALLET_NOTIFICATIONS__BUFFER_SIZE", DEFAULT_BUFFER_SIZE)?;
        if buffer_size == 0 {
            return Err(ConfigError::InvalidValue {
                var: "SPVWALLET_NOTIFICATIONS__BUFFER_SIZE",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            enabled: env::bool_or("SPVWALLET_NOTIFICATIONS__ENABLED", true)?,
            buffer_size,
            webhook_max_retries: env::parse_or("SPVWALLET_NOTIFICATIONS__WEBHOOK_MAX_RETRIES", 3)?,
            webhook_ban_time: Duration::from_secs(env::parse_or(
                "SPVWALLET_NOTIFICATIONS__WEBHOOK_BAN_SECS",
                3600,
            )?),
            webhook_retry_delay: Duration::from_millis(env::parse_or(
                "SPVWALLET_NOTIFICATIONS__WEBHOOK_RETRY_DELAY_MS",
                1000,
            )?),
            webhook_timeout: Duration::from_secs(env::parse_or(
                "SPVWALLET_NOTIFICATIONS__WEBHOOK_TIMEOUT_SECS",
                10,
            )?),
        })
    }

    /// Retry and ban policy applied to every webhook.
    pub fn delivery_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy {
            max_retries: self.webhook_max_retries.max(1),
            initial_delay: self.webhook_retry_delay,
            max_delay: MAX_RETRY_DELAY.max(self.webhook_retry_delay),
            multiplier: 2.0,
            ban_time: self.webhook_ban_time,
        }
    }
}
