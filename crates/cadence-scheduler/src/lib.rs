//! Per-frame callback scheduler for Cadence.
//!
//! This crate provides a single-threaded scheduler that:
//! - Calls per-frame update callbacks, bucketed by the sign of their priority
//! - Fires interval timers, any number per target, each on its own cadence
//! - Lets callbacks schedule, unschedule, pause and resume targets mid-tick
//! - Scales every delta by a global time scale
//! - Exposes a lazily created process-wide instance with explicit teardown

mod config;
mod entry;
mod error;
mod registry;
mod scheduler;
mod shared;
mod timer;
mod types;

pub use config::{CatchUp, SchedulerConfig};
pub use error::SchedulerError;
pub use scheduler::{Scheduler, SchedulerStats};
pub use shared::{get_shared, init_shared, purge_shared};
pub use timer::Timer;
pub use types::{CallbackError, CallbackResult, Selector, TargetId, Tickable};
