#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use spv_events::{DeliveryPolicy, Event};

/// A request captured by [`TestEndpoint`].
#[derive(Debug, Clone)]
pub struct Recorded {
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

#[derive(Default)]
struct EndpointState {
    /// Statuses to answer with, in order. `200` once exhausted.
    statuses: Mutex<VecDeque<u16>>,
    fallback: Mutex<u16>,
    requests: Mutex<Vec<Recorded>>,
    /// Time spent before answering each request.
    delay: Mutex<Duration>,
    /// Requests that have been answered.
    completed: AtomicUsize,
}

/// Local HTTP server that records every POST to `/hook`.
pub struct TestEndpoint {
    pub url: String,
    state: Arc<EndpointState>,
}

impl TestEndpoint {
    /// Start a server that answers every request with `status`.
    pub async fn start(status: u16) -> Self {
        let state = Arc::new(EndpointState::default());
        *state.fallback.lock().unwrap() = status;

        let app = Router::new()
            .route("/hook", post(record))
            .with_state(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}/hook"),
            state,
        }
    }

    /// Answer the next requests with `statuses` before the fallback applies.
    pub fn respond_with(&self, statuses: &[u16]) {
        self.state.statuses.lock().unwrap().extend(statuses);
    }

    pub fn set_status(&self, status: u16) {
        *self.state.fallback.lock().unwrap() = status;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = delay;
    }

    pub fn completed(&self) -> usize {
        self.state.completed.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Wait until at least `count` requests arrived, or panic after 5s.
    pub async fn wait_for(&self, count: usize) -> Vec<Recorded> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let seen = self.requests();
            if seen.len() >= count {
                return seen;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {count} requests, got {}",
                seen.len()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

async fn record(
    State(state): State<Arc<EndpointState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let body = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    state.requests.lock().unwrap().push(Recorded { headers, body });

    let delay = *state.delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let status = state
        .statuses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| *state.fallback.lock().unwrap());
    state.completed.fetch_add(1, Ordering::SeqCst);
    StatusCode::from_u16(status).unwrap()
}

/// Fast policy so retry and ban scenarios finish quickly.
pub fn fast_policy(max_retries: u32, ban_time: Duration) -> DeliveryPolicy {
    DeliveryPolicy {
        max_retries,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        multiplier: 2.0,
        ban_time,
    }
}

pub fn raw_event(event_type: &str, content: serde_json::Value) -> Event {
    Event::raw(event_type, content).unwrap()
}
