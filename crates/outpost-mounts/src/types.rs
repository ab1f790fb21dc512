use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A single bind mount to pass to the container runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host_path: PathBuf,
    pub container_path: String,
    pub read_only: bool,
}

impl Mount {
    pub fn new(host_path: impl Into<PathBuf>, container_path: impl Into<String>, read_only: bool) -> Self {
        Self { host_path: host_path.into(), container_path: container_path.into(), read_only }
    }
}

/// A requested extra mount that the allowlist rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedMount {
    pub requested: String,
    pub reason: String,
}

/// The full set of mounts for one worker invocation, plus anything dropped.
#[derive(Debug, Clone, Default)]
pub struct MountPlan {
    pub mounts: Vec<Mount>,
    pub dropped: Vec<DroppedMount>,
}

/// Roots and blocked patterns governing additional, user-requested mounts.
/// Stored outside the project root and never itself mounted into a worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Allowlist {
    pub roots: Vec<PathBuf>,
    pub blocked_globs: Vec<String>,
}
