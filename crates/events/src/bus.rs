//! In-process notification bus with bounded, drop-on-full queues.
//!
//! [`NotificationService`] accepts events through a non-blocking
//! [`notify`](NotificationService::notify) into a bounded ingress queue. A
//! background dispatch loop, started with
//! [`start`](NotificationService::start), copies each event to every
//! registered subscriber's own bounded queue. Whenever a queue is full the
//! event is dropped for that queue only and a warning is logged.
//!
//! The service is designed to be shared via `Arc<NotificationService>`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_BUFFER_SIZE;
use crate::event::Event;

/// Receiving end handed to a subscriber.
pub type EventReceiver = mpsc::Receiver<Event>;

type Subscribers = Arc<RwLock<HashMap<String, mpsc::Sender<Event>>>>;

#[derive(Debug)]
struct DispatchLoop {
    cancel: CancellationToken,
    handle: JoinHandle<EventReceiver>,
}

// ---------------------------------------------------------------------------
// NotificationService
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct NotificationService {
    ingress_tx: mpsc::Sender<Event>,
    /// Ingress receiver while the dispatch loop is stopped. The loop owns
    /// it while running and hands it back on stop, so queued events survive
    /// a restart.
    parked_rx: Mutex<Option<EventReceiver>>,
    subscribers: Subscribers,
    dispatch: Mutex<Option<DispatchLoop>>,
}

impl NotificationService {
    /// Create a stopped service whose ingress queue holds `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (ingress_tx, ingress_rx) = mpsc::channel(capacity.max(1));
        Self {
            ingress_tx,
            parked_rx: Mutex::new(Some(ingress_rx)),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            dispatch: Mutex::new(None),
        }
    }

    /// Enqueue an event for fan-out. Never blocks.
    ///
    /// When the ingress queue is full the event is dropped and a warning is
    /// logged. Events enqueued while the service is stopped wait in the
    /// queue until the next [`start`](Self::start).
    pub fn notify(&self, event: Event) {
        match self.ingress_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(
                    event_type = event.event_type(),
                    "Notification queue full, dropping event"
                );
            }
            Err(TrySendError::Closed(event)) => {
                tracing::warn!(
                    event_type = event.event_type(),
                    "Notification queue closed, dropping event"
                );
            }
        }
    }

    /// Register a subscriber under `key` and return its receiving end.
    ///
    /// Registering an existing key replaces the previous subscriber, whose
    /// receiver then observes end-of-stream.
    pub async fn add_subscriber(&self, key: &str, buffer_size: usize) -> EventReceiver {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        let previous = self.subscribers.write().await.insert(key.to_string(), tx);
        if previous.is_some() {
            tracing::debug!(subscriber = key, "Replaced existing subscriber");
        }
        rx
    }

    /// Unregister the subscriber under `key`. Unknown keys are a no-op.
    ///
    /// Events dispatched after this call never reach the removed subscriber.
    pub async fn remove_subscriber(&self, key: &str) {
        self.subscribers.write().await.remove(key);
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn is_running(&self) -> bool {
        self.dispatch.lock().await.is_some()
    }

    /// Start the dispatch loop. A no-op when already running.
    pub async fn start(&self) {
        let mut dispatch = self.dispatch.lock().await;
        if dispatch.is_some() {
            return;
        }

        let Some(rx) = self.parked_rx.lock().await.take() else {
            tracing::error!("Notification ingress queue is unavailable, dispatch not started");
            return;
        };

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(dispatch_loop(
            rx,
            Arc::clone(&self.subscribers),
            cancel.clone(),
        ));
        *dispatch = Some(DispatchLoop { cancel, handle });
        tracing::info!("Notification service started");
    }

    /// Stop the dispatch loop and wait for it to exit.
    ///
    /// Events still in the ingress queue stay there for the next start.
    pub async fn stop(&self) {
        let mut dispatch = self.dispatch.lock().await;
        let Some(running) = dispatch.take() else {
            return;
        };

        running.cancel.cancel();
        match running.handle.await {
            Ok(rx) => {
                *self.parked_rx.lock().await = Some(rx);
            }
            Err(e) => {
                tracing::error!(error = %e, "Notification dispatch loop panicked");
            }
        }
        tracing::info!("Notification service stopped");
    }
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

// ---------------------------------------------------------------------------
// Dispatch loop
// ---------------------------------------------------------------------------

/// Fan events out until cancelled, then return the ingress receiver.
async fn dispatch_loop(
    mut rx: EventReceiver,
    subscribers: Subscribers,
    cancel: CancellationToken,
) -> EventReceiver {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(event) => event,
                None => break,
            },
        };

        let mut closed = Vec::new();
        {
            let subs = subscribers.read().await;
            for (key, tx) in subs.iter() {
                match tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(
                            subscriber = %key,
                            event_type = event.event_type(),
                            "Subscriber queue full, dropping event"
                        );
                    }
                    Err(TrySendError::Closed(_)) => closed.push(key.clone()),
                }
            }
        }

        if !closed.is_empty() {
            let mut subs = subscribers.write().await;
            for key in closed {
                // Only prune if the key was not re-registered meanwhile.
                if subs.get(&key).is_some_and(|tx| tx.is_closed()) {
                    subs.remove(&key);
                    tracing::debug!(subscriber = %key, "Pruned closed subscriber");
                }
            }
        }
    }
    rx
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
