//! Integration tests for [`ClusterClient`] locking and pub/sub.
//!
//! The Redis coordinator is exercised against a shared [`MemoryCache`] so
//! two clients behave like two instances racing on the same store.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use spv_cache::{CacheStore, MemoryCache};
use spv_cluster::{Channel, ClusterClient, ClusterConfig, ClusterError, Coordinator};

fn remote_pair(store: &Arc<MemoryCache>) -> (ClusterClient, ClusterClient) {
    let config = ClusterConfig::redis("redis://127.0.0.1:6379/0");
    let a = ClusterClient::new(config.clone()).with_lock_store(Arc::clone(store) as Arc<dyn CacheStore>);
    let b = ClusterClient::new(config).with_lock_store(Arc::clone(store) as Arc<dyn CacheStore>);
    (a, b)
}

// ---------------------------------------------------------------------------
// Test: memory coordinator always grants the lock
// ---------------------------------------------------------------------------

#[tokio::test]
async fn memory_coordinator_try_lock_always_succeeds() {
    let client = ClusterClient::new(ClusterConfig::default());
    client.connect().await.unwrap();

    let ttl = Duration::from_secs(60);
    assert!(client.try_lock("job", ttl).await);
    assert!(client.try_lock("job", ttl).await);
    assert_eq!(client.coordinator(), Coordinator::Memory);
}

// ---------------------------------------------------------------------------
// Test: remote coordinator grants the lease to one instance only
// ---------------------------------------------------------------------------

#[tokio::test]
async fn remote_second_try_lock_before_expiry_fails() {
    let store = Arc::new(MemoryCache::default());
    let (a, b) = remote_pair(&store);
    a.connect().await.unwrap();
    b.connect().await.unwrap();

    let ttl = Duration::from_secs(60);
    assert!(a.try_lock("cleanup", ttl).await);
    assert!(!b.try_lock("cleanup", ttl).await);
    assert!(!a.try_lock("cleanup", ttl).await);

    // Different keys do not contend.
    assert!(b.try_lock("metrics", ttl).await);

    // The lease records the holder for operators.
    let holder = store.get("bsv_lock:cleanup").await.unwrap();
    assert_eq!(holder.as_deref(), Some(a.instance_id()));
}

// ---------------------------------------------------------------------------
// Test: an expired lease can be re-acquired by another instance
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn remote_lock_is_reacquirable_after_ttl() {
    let store = Arc::new(MemoryCache::default());
    let (a, b) = remote_pair(&store);
    a.connect().await.unwrap();
    b.connect().await.unwrap();

    let ttl = Duration::from_secs(30);
    assert!(a.try_lock("sweep", ttl).await);

    tokio::time::advance(Duration::from_secs(31)).await;

    assert!(b.try_lock("sweep", ttl).await);
}

// ---------------------------------------------------------------------------
// Test: remote coordinator fails closed when not connected
// ---------------------------------------------------------------------------

#[tokio::test]
async fn remote_try_lock_without_connect_is_not_acquired() {
    let store = Arc::new(MemoryCache::default());
    let (a, _) = remote_pair(&store);

    assert!(!a.try_lock("job", Duration::from_secs(5)).await);
}

// ---------------------------------------------------------------------------
// Test: invalid Redis URL is a connect-time error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_redis_url_fails_connect() {
    let client = ClusterClient::new(ClusterConfig::redis("definitely not a url"));

    assert_matches!(client.connect().await, Err(ClusterError::Redis(_)));
    assert!(!client.is_connected().await);
}

// ---------------------------------------------------------------------------
// Test: pub/sub is lazy, shared, and torn down on close
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pubsub_requires_connect() {
    let client = ClusterClient::new(ClusterConfig::default());
    assert_matches!(client.pubsub().await, Err(ClusterError::NotConnected));
}

#[tokio::test]
async fn memory_pubsub_round_trip_through_client() {
    let client = ClusterClient::new(ClusterConfig::default());
    client.connect().await.unwrap();

    let pubsub = client.pubsub().await.unwrap();
    let mut sub = pubsub.subscribe(Channel::DestinationNew.as_str()).await.unwrap();

    // A second call returns the same backend.
    client
        .pubsub()
        .await
        .unwrap()
        .publish(Channel::DestinationNew.as_str(), "addr-1")
        .await
        .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(1), sub.recv())
        .await
        .expect("message should arrive");
    assert_eq!(msg.as_deref(), Some("addr-1"));
    assert_eq!(sub.channel(), "new-destination");

    client.close().await.unwrap();
    assert!(sub.recv().await.is_none());
    assert_matches!(client.pubsub().await, Err(ClusterError::NotConnected));
}
