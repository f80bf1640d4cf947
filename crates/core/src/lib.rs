//! Shared building blocks for the wallet coordination layer.
//!
//! - [`error`]: configuration error type.
//! - [`env`]: helpers for reading configuration from the environment.
//! - [`types`]: common type aliases.
//! - [`channels`]: well-known pub/sub channel and cron job names.

pub mod channels;
pub mod env;
pub mod error;
pub mod types;

pub use error::ConfigError;
pub use types::Timestamp;
