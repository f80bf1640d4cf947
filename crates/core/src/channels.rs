//! Well-known names shared between instances of the service.
//!
//! Channel names are published unprefixed; the remote pub/sub backend adds
//! the configured cluster prefix. Job names double as cluster lock keys, so
//! every instance must agree on them.

/// Published when a new destination is created so peers can refresh caches.
pub const CHANNEL_DESTINATION_NEW: &str = "new-destination";

/// Periodic sweep of expired entries in the in-memory cache.
pub const JOB_CACHE_SWEEP: &str = "cache_sweep";

/// Name under which the webhook manager subscribes to the event bus.
pub const SUBSCRIBER_WEBHOOKS: &str = "webhooks";
