//! Builds the ordered bind mount list for a worker container invocation.

pub mod error;
pub mod planner;
pub mod types;

pub use error::{MountError, Result};
pub use planner::{plan_mounts, MountRequest};
pub use types::{Allowlist, DroppedMount, Mount, MountPlan};
