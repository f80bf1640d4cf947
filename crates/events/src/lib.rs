//! Event notifications for the wallet engine.
//!
//! - [`event`]: the immutable [`Event`] envelope and its JSON shape.
//! - [`bus`]: [`NotificationService`], the in-process fan-out bus.
//! - [`delivery`]: webhook notifiers and the [`WebhookManager`].
//! - [`config`]: [`NotificationConfig`] loaded from the environment.

pub mod bus;
pub mod config;
pub mod delivery;
pub mod event;

pub use bus::{EventReceiver, NotificationService};
pub use config::NotificationConfig;
pub use delivery::{DeliveryPolicy, WebhookConfig, WebhookError, WebhookManager, WebhookStatus};
pub use event::{Event, EventError, EventKind, TransactionEvent};
