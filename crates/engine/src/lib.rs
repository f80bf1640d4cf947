//! Composition root of the wallet coordination layer.
//!
//! [`Engine`] wires the cache, the cluster coordinator, the notification
//! bus, the webhook manager and the task scheduler together and drives
//! their lifecycle as one unit.

pub mod config;
pub mod engine;
pub mod error;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::EngineError;
