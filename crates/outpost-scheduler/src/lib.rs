//! Drives scheduled tasks (cron, interval, once) against the tasks the
//! Store already persists, delegating execution to the dispatch layer.

pub mod engine;
pub mod error;
pub mod schedule;
pub mod types;

pub use engine::SchedulerEngine;
pub use error::{Result, SchedulerError};
pub use schedule::compute_next_run;
pub use types::{TaskOutcome, TaskRunner};
