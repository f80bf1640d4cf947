//! Pub/sub backends for cross-instance messaging.
//!
//! Both backends hand out a bounded [`Subscription`] per `subscribe` call.
//! A subscription whose queue is full drops the message and logs it; a
//! slow subscriber never blocks the publisher.

pub mod memory;
pub mod redis;

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;

use crate::error::ClusterError;

pub use self::memory::MemoryPubSub;
pub use self::redis::RedisPubSub;

/// Capacity of each subscription queue.
pub const SUBSCRIPTION_BUFFER: usize = 100;

/// Named channels shared by every instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    DestinationNew,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DestinationNew => spv_core::channels::CHANNEL_DESTINATION_NEW,
        }
    }
}

/// Publish/subscribe contract shared by the memory and Redis backends.
#[async_trait]
pub trait PubSubService: Send + Sync {
    /// Start receiving messages published on `channel`.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, ClusterError>;

    /// Deliver `message` to every current subscriber of `channel`.
    async fn publish(&self, channel: &str, message: &str) -> Result<(), ClusterError>;

    /// Tear down all subscriptions. Their receivers observe end-of-stream.
    async fn close(&self) -> Result<(), ClusterError>;
}

impl std::fmt::Debug for dyn PubSubService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn PubSubService")
    }
}

/// Receiving end of a channel subscription.
///
/// Yields `None` once the backend is closed.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    rx: mpsc::Receiver<String>,
}

impl Subscription {
    pub(crate) fn new(channel: impl Into<String>, rx: mpsc::Receiver<String>) -> Self {
        Self {
            channel: channel.into(),
            rx,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Push `message` into a subscription queue without waiting.
///
/// Returns `false` when the receiver is gone and the sender should be
/// discarded.
pub(crate) fn forward(tx: &mpsc::Sender<String>, channel: &str, message: &str) -> bool {
    match tx.try_send(message.to_string()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(channel, "Subscription queue full, dropping message");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}
