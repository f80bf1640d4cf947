use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use spv_cluster::ClusterClient;

use crate::job::CronJob;

/// Wrap `job` so each tick first takes the cluster lease `key` for `ttl`.
///
/// Ticks that do not obtain the lease skip the handler. With the memory
/// coordinator every tick runs. The lease is never renewed; a handler that
/// outlives `ttl` may overlap with another instance.
pub fn with_cluster_lock(
    cluster: Arc<ClusterClient>,
    key: impl Into<String>,
    ttl: Duration,
    job: CronJob,
) -> CronJob {
    let key: String = key.into();
    let key: Arc<str> = Arc::from(key);
    let inner = job.handler();
    let name = job.name().to_string();

    CronJob::from_handler(
        job.name(),
        job.period(),
        Arc::new(move || {
            let cluster = Arc::clone(&cluster);
            let key = Arc::clone(&key);
            let inner = Arc::clone(&inner);
            let name = name.clone();
            async move {
                if !cluster.try_lock(&key, ttl).await {
                    tracing::debug!(job = %name, lock = %key, "Lock held elsewhere, skipping run");
                    return Ok(());
                }
                inner().await
            }
            .boxed()
        }),
    )
}
