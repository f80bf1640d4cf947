use spv_cache::CacheError;
use spv_cluster::ClusterError;
use spv_core::ConfigError;
use spv_events::WebhookError;
use spv_taskmanager::TaskError;

/// Errors surfaced by the [`Engine`](crate::Engine).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The notification subsystem is switched off by configuration.
    #[error("Notifications are disabled")]
    NotificationsDisabled,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),
}

impl EngineError {
    /// HTTP status an admin endpoint should answer with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotificationsDisabled => 503,
            Self::Webhook(WebhookError::InvalidUrl { .. } | WebhookError::InvalidHeader { .. }) => {
                400
            }
            _ => 500,
        }
    }
}
