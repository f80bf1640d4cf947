use std::sync::Arc;

use spv_cache::{CacheClient, CacheEngine, CacheStore};
use spv_cluster::ClusterClient;
use spv_core::channels::JOB_CACHE_SWEEP;
use spv_events::{Event, NotificationService, WebhookManager};
use spv_taskmanager::{with_cluster_lock, CronJob, TaskManager};
use tokio::sync::Mutex;

use crate::config::EngineConfig;
use crate::error::EngineError;

/// Notification bus and webhook manager, present only when enabled.
struct Notifications {
    bus: Arc<NotificationService>,
    webhooks: Arc<WebhookManager>,
}

/// Owns every background subsystem of one service instance.
///
/// Subsystems start in dependency order (cache, cluster, bus, webhooks,
/// tasks) and stop in reverse.
pub struct Engine {
    config: EngineConfig,
    cache: Arc<CacheClient>,
    cluster: Arc<ClusterClient>,
    notifications: Option<Notifications>,
    tasks: Arc<TaskManager>,
    running: Mutex<bool>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let cluster = Arc::new(ClusterClient::new(config.cluster.clone()));
        Self::with_cluster(config, cluster)
    }

    /// Build an engine around a preconfigured cluster client.
    pub fn with_cluster(
        config: EngineConfig,
        cluster: Arc<ClusterClient>,
    ) -> Result<Self, EngineError> {
        let notifications = if config.notifications.enabled {
            let bus = Arc::new(NotificationService::new(config.notifications.buffer_size));
            let webhooks = Arc::new(WebhookManager::new(
                Arc::clone(&bus),
                &config.notifications,
            )?);
            Some(Notifications { bus, webhooks })
        } else {
            tracing::info!("Notifications disabled by configuration");
            None
        };

        Ok(Self {
            cache: Arc::new(CacheClient::new(config.cache.clone())),
            cluster,
            notifications,
            tasks: Arc::new(TaskManager::new()),
            running: Mutex::new(false),
            config,
        })
    }

    /// Connect the stores and start every background loop.
    pub async fn start(&self) -> Result<(), EngineError> {
        let mut running = self.running.lock().await;
        if *running {
            return Ok(());
        }

        // Registration validates the job, so a bad period fails before any
        // store is connected.
        if self.config.task.enabled && self.cache.engine() == CacheEngine::Memory {
            self.tasks.register(self.cache_sweep_job()).await?;
        }

        self.cache.connect().await?;
        tracing::info!(engine = %self.cache.engine(), "Cache connected");

        if let Err(e) = self.cluster.connect().await {
            self.close_cache().await;
            return Err(e.into());
        }
        tracing::info!(
            coordinator = %self.cluster.coordinator(),
            instance_id = %self.cluster.instance_id(),
            "Cluster connected"
        );

        if let Some(notifications) = &self.notifications {
            notifications.bus.start().await;
            notifications.webhooks.start().await;
        }

        if self.config.task.enabled {
            self.tasks.start().await;
        } else {
            tracing::info!("Task scheduler disabled by configuration");
        }

        *running = true;
        tracing::info!("Engine started");
        Ok(())
    }

    /// Stop every background loop, then close the stores.
    ///
    /// Close failures are logged; shutdown always runs to completion.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        if !*running {
            return;
        }

        self.tasks.stop().await;
        if let Some(notifications) = &self.notifications {
            notifications.webhooks.stop().await;
            notifications.bus.stop().await;
        }
        if let Err(e) = self.cluster.close().await {
            tracing::warn!(error = %e, "Failed to close cluster client");
        }
        self.close_cache().await;

        *running = false;
        tracing::info!("Engine stopped");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.lock().await
    }

    /// Push `event` onto the notification bus.
    ///
    /// Silently ignored when notifications are disabled.
    pub fn notify(&self, event: Event) {
        if let Some(notifications) = &self.notifications {
            notifications.bus.notify(event);
        }
    }

    pub fn notifications(&self) -> Result<&Arc<NotificationService>, EngineError> {
        self.notifications
            .as_ref()
            .map(|n| &n.bus)
            .ok_or(EngineError::NotificationsDisabled)
    }

    pub fn webhooks(&self) -> Result<&Arc<WebhookManager>, EngineError> {
        self.notifications
            .as_ref()
            .map(|n| &n.webhooks)
            .ok_or(EngineError::NotificationsDisabled)
    }

    /// Register `job` so each run first takes the cluster lease named after
    /// it, held for the configured lock TTL.
    ///
    /// On a fleet only one instance runs the job per lease.
    pub async fn register_locked_job(&self, job: CronJob) -> Result<(), EngineError> {
        let key = job.name().to_string();
        let locked = with_cluster_lock(
            Arc::clone(&self.cluster),
            key,
            self.config.task.lock_ttl,
            job,
        );
        self.tasks.register(locked).await?;
        Ok(())
    }

    pub fn task_manager(&self) -> &Arc<TaskManager> {
        &self.tasks
    }

    pub fn cluster(&self) -> &Arc<ClusterClient> {
        &self.cluster
    }

    pub fn cache(&self) -> &Arc<CacheClient> {
        &self.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Periodic removal of expired entries from the in-memory cache.
    ///
    /// Each instance sweeps its own memory, so no cluster lock is taken.
    fn cache_sweep_job(&self) -> CronJob {
        let cache = Arc::clone(&self.cache);
        CronJob::new(JOB_CACHE_SWEEP, self.config.task.cache_sweep_period, move || {
            let cache = Arc::clone(&cache);
            async move {
                let removed = cache.purge_expired().await?;
                if removed > 0 {
                    tracing::debug!(removed, "Swept expired cache entries");
                }
                Ok(())
            }
        })
    }

    async fn close_cache(&self) {
        if let Err(e) = self.cache.close().await {
            tracing::warn!(error = %e, "Failed to close cache");
        }
    }
}
