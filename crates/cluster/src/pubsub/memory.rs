use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{forward, PubSubService, Subscription, SUBSCRIPTION_BUFFER};
use crate::error::ClusterError;

/// In-process pub/sub for single-instance deployments.
#[derive(Default)]
pub struct MemoryPubSub {
    channels: Mutex<HashMap<String, Vec<mpsc::Sender<String>>>>,
}

impl MemoryPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels()
            .get(channel)
            .map_or(0, |senders| senders.iter().filter(|tx| !tx.is_closed()).count())
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, Vec<mpsc::Sender<String>>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PubSubService for MemoryPubSub {
    async fn subscribe(&self, channel: &str) -> Result<Subscription, ClusterError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.channels().entry(channel.to_string()).or_default().push(tx);
        Ok(Subscription::new(channel, rx))
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), ClusterError> {
        let mut channels = self.channels();
        if let Some(senders) = channels.get_mut(channel) {
            senders.retain(|tx| forward(tx, channel, message));
            if senders.is_empty() {
                channels.remove(channel);
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ClusterError> {
        self.channels().clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
