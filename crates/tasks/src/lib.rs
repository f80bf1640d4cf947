//! Periodic background jobs for the wallet engine.
//!
//! - [`job`]: [`CronJob`], a named handler re-run every period.
//! - [`manager`]: [`TaskManager`], which owns one run loop per job.
//! - [`lock`]: [`with_cluster_lock`], a wrapper that runs a job on one
//!   instance of the fleet per lease.
//! - [`config`]: [`TaskConfig`] loaded from the environment.

pub mod config;
pub mod error;
pub mod job;
pub mod lock;
pub mod manager;

pub use config::TaskConfig;
pub use error::TaskError;
pub use job::CronJob;
pub use lock::with_cluster_lock;
pub use manager::TaskManager;
