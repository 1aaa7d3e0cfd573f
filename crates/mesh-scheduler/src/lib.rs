//! Periodic job runner for the mesh recorder.
//!
//! Wraps `tokio-cron-scheduler` with:
//! - fixed-interval and 6-field cron schedules (timezone aware via chrono-tz)
//! - graceful shutdown through a shared `CancellationToken` that waits
//!   for in-flight runs up to a grace period
//! - overlap prevention: a tick that arrives while the previous run of the
//!   same job is still active is skipped and recorded as such
//!
//! # Example
//!
//! ```ignore
//! use mesh_scheduler::{JobResult, SchedulerConfig, SchedulerService};
//! use std::time::Duration;
//!
//! let scheduler = SchedulerService::new(SchedulerConfig::default()).await?;
//! scheduler
//!     .add_interval_job("checkpoint", Duration::from_secs(300), |_token| async {
//!         JobResult::Success
//!     })
//!     .await?;
//! scheduler.start().await?;
//! ```

mod config;
mod error;
mod overlap;
mod registry;
mod scheduler;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use overlap::{OverlapGuard, RunGuard};
pub use registry::JobResult;
pub use scheduler::{validate_cron_expression, SchedulerService};
