//! Integration tests for [`CacheClient`] with the in-memory engine.

use std::time::Duration;

use assert_matches::assert_matches;
use spv_cache::{CacheClient, CacheConfig, CacheError, CacheStore};

fn memory_client(max_keys: usize) -> CacheClient {
    CacheClient::new(CacheConfig {
        max_keys,
        ..CacheConfig::default()
    })
}

// ---------------------------------------------------------------------------
// Test: operations before connect() fail
// ---------------------------------------------------------------------------

#[tokio::test]
async fn operations_before_connect_return_not_connected() {
    let client = memory_client(10);

    assert!(!client.is_connected().await);
    assert_matches!(client.get("k").await, Err(CacheError::NotConnected));
    assert_matches!(client.set("k", "v", None).await, Err(CacheError::NotConnected));
    assert_matches!(client.purge_expired().await, Err(CacheError::NotConnected));
}

// ---------------------------------------------------------------------------
// Test: connect, use, close lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connected_client_round_trips_values() {
    let client = memory_client(10);
    client.connect().await.unwrap();
    assert!(client.is_connected().await);

    client.set("greeting", "hello", Some(Duration::from_secs(60))).await.unwrap();
    assert_eq!(client.get("greeting").await.unwrap().as_deref(), Some("hello"));
    assert!(client.exists("greeting").await.unwrap());

    client.delete("greeting").await.unwrap();
    assert!(!client.exists("greeting").await.unwrap());

    client.close().await.unwrap();
    assert!(!client.is_connected().await);
    assert_matches!(client.get("greeting").await, Err(CacheError::NotConnected));
}

// ---------------------------------------------------------------------------
// Test: connect() twice keeps the same data
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_connect_is_noop() {
    let client = memory_client(10);
    client.connect().await.unwrap();
    client.set("k", "v", None).await.unwrap();

    client.connect().await.unwrap();

    assert_eq!(client.get("k").await.unwrap().as_deref(), Some("v"));
}

// ---------------------------------------------------------------------------
// Test: set_if_absent through the client
// ---------------------------------------------------------------------------

#[tokio::test]
async fn set_if_absent_only_first_writer_wins() {
    let client = memory_client(10);
    client.connect().await.unwrap();

    let ttl = Duration::from_secs(30);
    assert!(client.set_if_absent("lock:job", "a", ttl).await.unwrap());
    assert!(!client.set_if_absent("lock:job", "b", ttl).await.unwrap());
}

// ---------------------------------------------------------------------------
// Test: flush clears everything
// ---------------------------------------------------------------------------

#[tokio::test]
async fn flush_removes_all_keys() {
    let client = memory_client(10);
    client.connect().await.unwrap();
    client.set("a", "1", None).await.unwrap();
    client.set("b", "2", None).await.unwrap();

    client.flush().await.unwrap();

    assert!(!client.exists("a").await.unwrap());
    assert!(!client.exists("b").await.unwrap());
    assert_eq!(client.purge_expired().await.unwrap(), 0);
}
