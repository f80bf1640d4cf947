//! Redis-backed pub/sub for multi-instance coordination.
//!
//! Every subscription opens its own pub/sub connection and a forwarding
//! task; publishing goes through a shared [`ConnectionManager`] created on
//! first use. Channel names are prefixed with the cluster prefix.

use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::AsyncCommands;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex, OnceCell};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{forward, PubSubService, Subscription, SUBSCRIPTION_BUFFER};
use crate::error::ClusterError;

/// How long `close()` waits for each forwarding task to exit.
const LISTENER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RedisPubSub {
    client: ::redis::Client,
    prefix: String,
    publisher: OnceCell<ConnectionManager>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for RedisPubSub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPubSub")
            .field("client", &self.client)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl RedisPubSub {
    /// Build a backend for `redis_url`. Fails only if the URL is invalid;
    /// no connection is opened until the first publish or subscribe.
    pub fn new(redis_url: &str, prefix: impl Into<String>) -> Result<Self, ClusterError> {
        Ok(Self {
            client: ::redis::Client::open(redis_url)?,
            prefix: prefix.into(),
            publisher: OnceCell::new(),
            listeners: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
        })
    }

    fn full_channel(&self, channel: &str) -> String {
        format!("{}{}", self.prefix, channel)
    }

    async fn publisher(&self) -> Result<ConnectionManager, ClusterError> {
        let conn = self
            .publisher
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl PubSubService for RedisPubSub {
    async fn subscribe(&self, channel: &str) -> Result<Subscription, ClusterError> {
        if self.cancel.is_cancelled() {
            return Err(ClusterError::NotConnected);
        }

        let full_channel = self.full_channel(channel);
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&full_channel).await?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let cancel = self.cancel.child_token();
        let listener_channel = full_channel.clone();

        let handle = tokio::spawn(async move {
            let mut messages = pubsub.on_message();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = messages.next() => {
                        let Some(msg) = msg else {
                            tracing::warn!(channel = %listener_channel, "Redis subscription stream ended");
                            break;
                        };
                        match msg.get_payload::<String>() {
                            Ok(payload) => {
                                if !forward(&tx, &listener_channel, &payload) {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(
                                    channel = %listener_channel,
                                    error = %e,
                                    "Ignoring non-text pub/sub payload",
                                );
                            }
                        }
                    }
                }
            }
            tracing::debug!(channel = %listener_channel, "Redis subscription listener exited");
        });

        self.listeners.lock().await.push(handle);
        tracing::info!(channel = %full_channel, "Subscribed to Redis channel");
        Ok(Subscription::new(channel, rx))
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), ClusterError> {
        let mut conn = self.publisher().await?;
        let _: () = conn.publish(self.full_channel(channel), message).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), ClusterError> {
        self.cancel.cancel();
        let handles: Vec<_> = self.listeners.lock().await.drain(..).collect();
        for handle in handles {
            if tokio::time::timeout(LISTENER_SHUTDOWN_TIMEOUT, handle).await.is_err() {
                tracing::warn!("Redis subscription listener did not stop in time");
            }
        }
        Ok(())
    }
}
