use spv_cache::CacheConfig;
use spv_cluster::ClusterConfig;
use spv_core::ConfigError;
use spv_events::NotificationConfig;
use spv_taskmanager::TaskConfig;

/// Settings for every subsystem the [`Engine`](crate::Engine) builds.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub cluster: ClusterConfig,
    pub notifications: NotificationConfig,
    pub task: TaskConfig,
}

impl EngineConfig {
    /// Load every section from `SPVWALLET_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            cache: CacheConfig::from_env()?,
            cluster: ClusterConfig::from_env()?,
            notifications: NotificationConfig::from_env()?,
            task: TaskConfig::from_env()?,
        })
    }
}
