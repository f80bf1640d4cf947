//! End-to-end lifecycle of the [`Engine`] composition root.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use spv_cache::{CacheStore, MemoryCache};
use spv_cluster::{ClusterClient, ClusterConfig, ClusterError};
use spv_engine::{Engine, EngineConfig, EngineError};
use spv_events::Event;
use spv_taskmanager::{CronJob, TaskError};

type Received = Arc<Mutex<Vec<serde_json::Value>>>;

/// Start a webhook receiver and return its URL plus the captured bodies.
async fn webhook_receiver() -> (String, Received) {
    async fn record(State(received): State<Received>, Json(body): Json<serde_json::Value>) {
        received.lock().unwrap().push(body);
    }

    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/hook", post(record))
        .with_state(Arc::clone(&received));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/hook"), received)
}

async fn wait_for_bodies(received: &Received, count: usize) -> Vec<serde_json::Value> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let bodies = received.lock().unwrap().clone();
        if bodies.len() >= count {
            return bodies;
        }
        assert!(tokio::time::Instant::now() < deadline, "webhook never called");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn default_engine_starts_and_stops_every_subsystem() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    engine.start().await.unwrap();

    assert!(engine.is_running().await);
    assert!(engine.cache().is_connected().await);
    assert!(engine.cluster().is_connected().await);
    assert!(engine.notifications().unwrap().is_running().await);
    assert!(engine.webhooks().unwrap().is_running().await);
    assert!(engine.task_manager().is_running().await);
    assert_eq!(engine.task_manager().jobs().await, vec!["cache_sweep".to_string()]);

    engine.stop().await;

    assert!(!engine.is_running().await);
    assert!(!engine.cache().is_connected().await);
    assert!(!engine.cluster().is_connected().await);
    assert!(!engine.notifications().unwrap().is_running().await);
    assert!(!engine.task_manager().is_running().await);
}

#[tokio::test]
async fn start_twice_is_harmless() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    engine.start().await.unwrap();
    engine.start().await.unwrap();
    assert_eq!(engine.task_manager().jobs().await.len(), 1);
    engine.stop().await;
    engine.stop().await;
}

#[tokio::test]
async fn disabled_tasks_leave_scheduler_idle() {
    let mut config = EngineConfig::default();
    config.task.enabled = false;
    let engine = Engine::new(config).unwrap();

    engine.start().await.unwrap();
    assert!(!engine.task_manager().is_running().await);
    assert!(engine.task_manager().jobs().await.is_empty());
    engine.stop().await;
}

#[tokio::test]
async fn cluster_failure_aborts_start_and_closes_cache() {
    let mut config = EngineConfig::default();
    config.cluster = ClusterConfig::redis("not a redis url");
    let engine = Engine::new(config).unwrap();

    let result = engine.start().await;
    assert_matches!(result, Err(EngineError::Cluster(ClusterError::Redis(_))));
    assert!(!engine.is_running().await);
    assert!(!engine.cache().is_connected().await);
}

#[tokio::test]
async fn zero_sweep_period_fails_before_connecting() {
    let mut config = EngineConfig::default();
    config.task.cache_sweep_period = Duration::ZERO;
    let engine = Engine::new(config).unwrap();

    let result = engine.start().await;
    assert_matches!(result, Err(EngineError::Task(TaskError::ZeroPeriod { .. })));
    assert!(!engine.is_running().await);
    assert!(!engine.cache().is_connected().await);
    assert!(!engine.cluster().is_connected().await);
    assert!(!engine.notifications().unwrap().is_running().await);
    assert!(!engine.webhooks().unwrap().is_running().await);
}

#[tokio::test]
async fn cache_is_usable_while_running() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    engine.start().await.unwrap();

    let cache = engine.cache();
    cache.set("k", "v", None).await.unwrap();
    assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
    engine.stop().await;
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[tokio::test]
async fn notified_event_reaches_subscribed_webhook() {
    let (url, received) = webhook_receiver().await;
    let engine = Engine::new(EngineConfig::default()).unwrap();
    engine.start().await.unwrap();

    engine.webhooks().unwrap().subscribe(&url, "", "").await.unwrap();
    let webhooks = engine.webhooks().unwrap().get_all().await;
    assert_eq!(webhooks.len(), 1);
    assert!(!webhooks[0].banned);

    engine.notify(Event::raw("t", json!({"v": 1})).unwrap());

    let bodies = wait_for_bodies(&received, 1).await;
    assert_eq!(bodies[0], json!({"type": "t", "content": {"v": 1}}));
    engine.stop().await;
}

#[tokio::test]
async fn disabled_notifications_report_service_unavailable() {
    let mut config = EngineConfig::default();
    config.notifications.enabled = false;
    let engine = Engine::new(config).unwrap();
    engine.start().await.unwrap();

    let err = engine.webhooks().err().unwrap();
    assert_matches!(err, EngineError::NotificationsDisabled);
    assert_eq!(err.http_status(), 503);
    assert_matches!(engine.notifications(), Err(EngineError::NotificationsDisabled));

    // A no-op rather than an error.
    engine.notify(Event::raw("t", json!({})).unwrap());
    engine.stop().await;
}

// ---------------------------------------------------------------------------
// Locked jobs
// ---------------------------------------------------------------------------

/// Engine on the Redis coordinator whose locks live in `store`.
fn fleet_member(store: &Arc<MemoryCache>, lock_ttl: Duration) -> Engine {
    let mut config = EngineConfig::default();
    config.cluster = ClusterConfig::redis("redis://127.0.0.1:6379/0");
    config.task.lock_ttl = lock_ttl;
    let cluster = ClusterClient::new(config.cluster.clone())
        .with_lock_store(Arc::clone(store) as Arc<dyn CacheStore>);
    Engine::with_cluster(config, Arc::new(cluster)).unwrap()
}

fn counting_job(calls: &Arc<AtomicUsize>) -> CronJob {
    let calls = Arc::clone(calls);
    CronJob::new("settle", Duration::from_millis(50), move || {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
}

#[tokio::test(start_paused = true)]
async fn locked_job_runs_on_one_engine_per_lease() {
    let store = Arc::new(MemoryCache::new(100));
    let calls = Arc::new(AtomicUsize::new(0));
    let engines = [
        fleet_member(&store, Duration::from_secs(3600)),
        fleet_member(&store, Duration::from_secs(3600)),
    ];
    for engine in &engines {
        engine.register_locked_job(counting_job(&calls)).await.unwrap();
        engine.start().await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(500)).await;
    for engine in &engines {
        engine.stop().await;
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn locked_job_runs_again_once_the_lock_ttl_lapses() {
    let store = Arc::new(MemoryCache::new(100));
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = fleet_member(&store, Duration::from_millis(120));
    engine.register_locked_job(counting_job(&calls)).await.unwrap();
    engine.start().await.unwrap();
    assert_eq!(
        engine.task_manager().jobs().await,
        vec!["cache_sweep".to_string(), "settle".to_string()]
    );

    tokio::time::sleep(Duration::from_millis(1000)).await;
    engine.stop().await;

    // Twenty ticks, but each lease blocks the next two.
    let runs = calls.load(Ordering::SeqCst);
    assert!((2..=10).contains(&runs), "ran {runs} times");
}
