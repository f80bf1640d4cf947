//! Cluster coordination for multi-instance deployments.
//!
//! [`ClusterClient`] hides the selected [`Coordinator`] backend behind one
//! interface: lease-based [`try_lock`](ClusterClient::try_lock) so periodic
//! jobs run once per period across the fleet, and a lazily constructed
//! [`PubSubService`] for cross-instance messages.
//!
//! The `memory` coordinator is only correct for a single running instance:
//! every lock succeeds and messages never leave the process.

pub mod client;
pub mod config;
pub mod error;
pub mod pubsub;

pub use client::ClusterClient;
pub use config::{ClusterConfig, Coordinator};
pub use error::ClusterError;
pub use pubsub::{Channel, MemoryPubSub, PubSubService, RedisPubSub, Subscription};
