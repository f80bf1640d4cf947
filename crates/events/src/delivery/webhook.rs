//! Per-endpoint webhook delivery with retry, backoff and temporary bans.
//!
//! Each [`WebhookNotifier`] owns a bounded queue and a background task that
//! POSTs queued events to one URL, one at a time and in order. An event is
//! attempted up to [`DeliveryPolicy::max_retries`] times in total; if every
//! attempt fails the endpoint is banned for [`DeliveryPolicy::ban_time`].
//! Events reaching a banned endpoint are dropped without any HTTP traffic.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::header::{HeaderName, HeaderValue};
use serde::Serialize;
use spv_core::Timestamp;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::event::Event;

/// Header used for the token when the subscriber does not name one.
pub const DEFAULT_TOKEN_HEADER: &str = "Authorization";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a status of 400 or above.
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Invalid webhook URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid webhook token header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },
}

// ---------------------------------------------------------------------------
// Policy and configuration
// ---------------------------------------------------------------------------

/// Retry schedule and ban duration shared by every webhook.
#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    /// Total attempts per event. Always at least one.
    pub max_retries: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for the backoff delay.
    pub max_delay: Duration,
    /// Factor applied to the delay after every failed attempt.
    pub multiplier: f64,
    /// How long an endpoint stays banned after an event exhausts its attempts.
    pub ban_time: Duration,
}

impl DeliveryPolicy {
    /// Compute the delay that follows `current`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier).min(self.max_delay)
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        crate::config::NotificationConfig::default().delivery_policy()
    }
}

/// One webhook subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub url: String,
    pub token_header: String,
    /// Sent in `token_header` when non-empty.
    pub token_value: String,
    pub banned_until: Option<Timestamp>,
}

impl WebhookConfig {
    /// Create an unbanned subscription. An empty `token_header` falls back
    /// to [`DEFAULT_TOKEN_HEADER`].
    pub fn new(
        url: impl Into<String>,
        token_header: impl Into<String>,
        token_value: impl Into<String>,
    ) -> Self {
        let token_header = token_header.into();
        Self {
            url: url.into(),
            token_header: if token_header.is_empty() {
                DEFAULT_TOKEN_HEADER.to_string()
            } else {
                token_header
            },
            token_value: token_value.into(),
            banned_until: None,
        }
    }

    /// Check that the URL is an absolute http(s) URL and that the token
    /// header can be put on the wire.
    pub fn validate(&self) -> Result<(), WebhookError> {
        let parsed = reqwest::Url::parse(&self.url).map_err(|e| WebhookError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(WebhookError::InvalidUrl {
                url: self.url.clone(),
                reason: format!("unsupported scheme {:?}", parsed.scheme()),
            });
        }
        self.token_header()?;
        Ok(())
    }

    pub fn is_banned_at(&self, now: DateTime<Utc>) -> bool {
        self.banned_until.is_some_and(|until| until > now)
    }

    fn token_header(&self) -> Result<Option<(HeaderName, HeaderValue)>, WebhookError> {
        if self.token_value.is_empty() {
            return Ok(None);
        }
        let invalid = |reason: String| WebhookError::InvalidHeader {
            name: self.token_header.clone(),
            reason,
        };
        let name = HeaderName::from_bytes(self.token_header.as_bytes())
            .map_err(|e| invalid(e.to_string()))?;
        let value = HeaderValue::from_str(&self.token_value).map_err(|e| invalid(e.to_string()))?;
        Ok(Some((name, value)))
    }
}

/// Externally visible state of a webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookStatus {
    pub url: String,
    pub banned: bool,
    pub banned_until: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// WebhookNotifier
// ---------------------------------------------------------------------------

/// State shared between a notifier handle and its delivery task.
struct Endpoint {
    config: RwLock<WebhookConfig>,
    client: reqwest::Client,
    policy: DeliveryPolicy,
}

enum Outcome {
    Delivered,
    Failed(WebhookError),
    Cancelled,
}

impl Endpoint {
    fn config(&self) -> WebhookConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_banned(&self) -> bool {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_banned_at(Utc::now())
    }

    fn ban(&self) -> Timestamp {
        let until = TimeDelta::from_std(self.policy.ban_time)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.config
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .banned_until = Some(until);
        until
    }

    fn clear_ban(&self) {
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        if config.banned_until.take().is_some() {
            tracing::info!(url = %config.url, "Webhook ban lifted after successful delivery");
        }
    }

    /// Execute a single POST request and check the response status.
    async fn try_send(&self, event: &Event) -> Result<(), WebhookError> {
        let config = self.config();
        let mut request = self.client.post(&config.url).json(event);
        if let Some((name, value)) = config.token_header()? {
            request = request.header(name, value);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        if status >= 400 {
            return Err(WebhookError::HttpStatus(status));
        }
        Ok(())
    }

    /// Attempt delivery with backoff. Only the sleeps between attempts are
    /// cancellable; a request in flight runs to completion or timeout.
    async fn deliver(&self, event: &Event, cancel: &CancellationToken) -> Outcome {
        let mut delay = self.policy.initial_delay;
        let mut attempt = 1;
        loop {
            let err = match self.try_send(event).await {
                Ok(()) => return Outcome::Delivered,
                Err(e) => e,
            };
            if attempt >= self.policy.max_retries {
                return Outcome::Failed(err);
            }
            tracing::warn!(
                attempt,
                url = %self.config().url,
                error = %err,
                "Webhook delivery attempt failed, retrying"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Outcome::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = self.policy.next_delay(delay);
            attempt += 1;
        }
    }
}

/// Delivers events to one webhook URL from a dedicated background task.
pub struct WebhookNotifier {
    endpoint: Arc<Endpoint>,
    tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl WebhookNotifier {
    /// Spawn the delivery task for `config`.
    ///
    /// The task stops when `cancel` fires or [`stop`](Self::stop) is called.
    pub fn spawn(
        config: WebhookConfig,
        client: reqwest::Client,
        policy: DeliveryPolicy,
        queue_capacity: usize,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let endpoint = Arc::new(Endpoint {
            config: RwLock::new(config),
            client,
            policy,
        });
        let handle = tokio::spawn(delivery_loop(rx, Arc::clone(&endpoint), cancel.clone()));
        Self {
            endpoint,
            tx,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn url(&self) -> String {
        self.endpoint.config().url
    }

    pub fn config(&self) -> WebhookConfig {
        self.endpoint.config()
    }

    pub fn is_banned(&self) -> bool {
        self.endpoint.is_banned()
    }

    pub fn status(&self) -> WebhookStatus {
        let config = self.endpoint.config();
        WebhookStatus {
            banned: config.is_banned_at(Utc::now()),
            url: config.url,
            banned_until: config.banned_until,
        }
    }

    /// Queue an event for delivery. Never blocks.
    ///
    /// Dropped without HTTP traffic when the endpoint is banned or its
    /// queue is full.
    pub fn enqueue(&self, event: Event) {
        if self.is_banned() {
            tracing::debug!(url = %self.url(), "Webhook banned, dropping event");
            return;
        }
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(
                    url = %self.url(),
                    event_type = event.event_type(),
                    "Webhook queue full, dropping event"
                );
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(url = %self.url(), "Webhook notifier stopped, dropping event");
            }
        }
    }

    /// Stop the delivery task and wait for it to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!(url = %self.url(), error = %e, "Webhook delivery task panicked");
            }
        }
    }
}

impl Drop for WebhookNotifier {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn delivery_loop(
    mut rx: mpsc::Receiver<Event>,
    endpoint: Arc<Endpoint>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(event) => event,
                None => break,
            },
        };

        if endpoint.is_banned() {
            tracing::debug!(url = %endpoint.config().url, "Webhook banned, dropping queued event");
            continue;
        }

        match endpoint.deliver(&event, &cancel).await {
            Outcome::Delivered => {
                endpoint.clear_ban();
                tracing::debug!(
                    url = %endpoint.config().url,
                    event_type = event.event_type(),
                    "Webhook delivered"
                );
            }
            Outcome::Failed(err) => {
                let until = endpoint.ban();
                tracing::warn!(
                    url = %endpoint.config().url,
                    attempts = endpoint.policy.max_retries,
                    error = %err,
                    banned_until = %until,
                    "Webhook delivery failed after all retries, banning endpoint"
                );
            }
            Outcome::Cancelled => break,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
