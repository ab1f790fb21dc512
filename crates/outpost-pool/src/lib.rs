//! Runs agent containers on behalf of a workspace, keeping at most one warm
//! worker alive per workspace and falling back to disposable cold workers
//! under contention or when the warm pool is disabled.

pub mod error;
pub mod pool;
pub mod protocol;
pub mod types;

pub use error::{PoolError, Result};
pub use pool::WorkerPool;
pub use types::{ContainerOutput, Job, RunOutcome, WorkerState};
