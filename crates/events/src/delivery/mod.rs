//! Outbound delivery of bus events.
//!
//! - [`webhook`]: per-URL notifier with retry, backoff and bans.
//! - [`manager`]: registry of webhook subscriptions fed from the bus.

pub mod manager;
pub mod webhook;

pub use manager::WebhookManager;
pub use webhook::{
    DeliveryPolicy, WebhookConfig, WebhookError, WebhookNotifier, WebhookStatus,
    DEFAULT_TOKEN_HEADER,
};
