//! Registry of webhook subscriptions fed from the notification bus.
//!
//! [`WebhookManager`] owns one [`WebhookNotifier`] per URL. Once started it
//! subscribes to the bus as [`SUBSCRIBER_WEBHOOKS`] and forwards every bus
//! event to all notifiers.

use std::collections::HashMap;
use std::sync::Arc;

use spv_core::channels::SUBSCRIBER_WEBHOOKS;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::{EventReceiver, NotificationService};
use crate::config::NotificationConfig;
use crate::delivery::webhook::{
    DeliveryPolicy, WebhookConfig, WebhookError, WebhookNotifier, WebhookStatus,
};
use crate::event::Event;

type Notifiers = Arc<RwLock<HashMap<String, WebhookNotifier>>>;

struct Forwarder {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct WebhookManager {
    bus: Arc<NotificationService>,
    client: reqwest::Client,
    policy: DeliveryPolicy,
    queue_capacity: usize,
    notifiers: Notifiers,
    /// Parent of every notifier's token, cancelled on stop.
    master_cancel: Mutex<CancellationToken>,
    forwarder: Mutex<Option<Forwarder>>,
}

impl WebhookManager {
    pub fn new(
        bus: Arc<NotificationService>,
        config: &NotificationConfig,
    ) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder()
            .timeout(config.webhook_timeout)
            .build()?;
        Ok(Self::with_client(
            bus,
            client,
            config.delivery_policy(),
            config.buffer_size,
        ))
    }

    /// Build a manager around a preconfigured HTTP client.
    pub fn with_client(
        bus: Arc<NotificationService>,
        client: reqwest::Client,
        policy: DeliveryPolicy,
        queue_capacity: usize,
    ) -> Self {
        Self {
            bus,
            client,
            policy,
            queue_capacity,
            notifiers: Arc::new(RwLock::new(HashMap::new())),
            master_cancel: Mutex::new(CancellationToken::new()),
            forwarder: Mutex::new(None),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.forwarder.lock().await.is_some()
    }

    /// Subscribe to the bus and begin forwarding. A no-op when running.
    pub async fn start(&self) {
        let mut forwarder = self.forwarder.lock().await;
        if forwarder.is_some() {
            return;
        }

        let rx = self
            .bus
            .add_subscriber(SUBSCRIBER_WEBHOOKS, self.queue_capacity)
            .await;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(forward_loop(
            rx,
            Arc::clone(&self.notifiers),
            cancel.clone(),
        ));
        *forwarder = Some(Forwarder { cancel, handle });
        tracing::info!("Webhook manager started");
    }

    /// Leave the bus, then stop every notifier and wait for them.
    ///
    /// All subscriptions are discarded.
    pub async fn stop(&self) {
        let mut forwarder = self.forwarder.lock().await;
        if let Some(running) = forwarder.take() {
            self.bus.remove_subscriber(SUBSCRIBER_WEBHOOKS).await;
            running.cancel.cancel();
            if let Err(e) = running.handle.await {
                tracing::error!(error = %e, "Webhook forwarder panicked");
            }
        }

        // Cancel in-flight backoffs in one go, then hand out a fresh parent
        // for subscriptions made after this stop. The master lock is taken
        // before the notifiers lock here and in `subscribe`.
        let drained: Vec<WebhookNotifier> = {
            let mut master = self.master_cancel.lock().await;
            master.cancel();
            *master = CancellationToken::new();
            self.notifiers
                .write()
                .await
                .drain()
                .map(|(_, notifier)| notifier)
                .collect()
        };

        // A request already in flight runs to completion or client timeout.
        let count = drained.len();
        for notifier in drained {
            notifier.stop().await;
        }
        tracing::info!(count, "Webhook manager stopped");
    }

    /// Register a webhook, replacing any existing subscription for `url`.
    ///
    /// The replacement starts unbanned with an empty queue.
    pub async fn subscribe(
        &self,
        url: &str,
        token_header: &str,
        token_value: &str,
    ) -> Result<(), WebhookError> {
        let config = WebhookConfig::new(url, token_header, token_value);
        config.validate()?;

        let previous = {
            let master = self.master_cancel.lock().await;
            let notifier = WebhookNotifier::spawn(
                config,
                self.client.clone(),
                self.policy.clone(),
                self.queue_capacity,
                master.child_token(),
            );
            self.notifiers.write().await.insert(url.to_string(), notifier)
        };

        if let Some(old) = previous {
            old.stop().await;
            tracing::info!(url, "Webhook subscription replaced");
        } else {
            tracing::info!(url, "Webhook subscribed");
        }
        Ok(())
    }

    /// Remove the webhook for `url`. Returns `false` when it was unknown.
    pub async fn unsubscribe(&self, url: &str) -> bool {
        let removed = self.notifiers.write().await.remove(url);
        match removed {
            Some(notifier) => {
                notifier.stop().await;
                tracing::info!(url, "Webhook unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Current subscriptions, sorted by URL.
    pub async fn get_all(&self) -> Vec<WebhookStatus> {
        let mut all: Vec<WebhookStatus> = self
            .notifiers
            .read()
            .await
            .values()
            .map(WebhookNotifier::status)
            .collect();
        all.sort_by(|a, b| a.url.cmp(&b.url));
        all
    }

    /// Hand `event` to every notifier directly, bypassing the bus.
    pub async fn dispatch(&self, event: &Event) {
        enqueue_all(&self.notifiers, event).await;
    }
}

async fn enqueue_all(notifiers: &Notifiers, event: &Event) {
    for notifier in notifiers.read().await.values() {
        notifier.enqueue(event.clone());
    }
}

async fn forward_loop(mut rx: EventReceiver, notifiers: Notifiers, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(event) => enqueue_all(&notifiers, &event).await,
                None => break,
            },
        }
    }
}
