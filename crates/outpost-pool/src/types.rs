use std::time::Duration;

use outpost_mounts::Mount;
use serde::{Deserialize, Serialize};

/// Per-workspace lifecycle of the warm worker pool entry. Every transition
/// is explicit — there is no bare `bool`/`Mutex<bool>` flag pair standing
/// in for this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Absent,
    Starting,
    Ready,
    Busy,
    Draining,
    Dead,
}

/// One unit of work submitted to the pool.
#[derive(Debug, Clone)]
pub struct Job {
    pub workspace: String,
    pub is_main: bool,
    pub input: serde_json::Value,
    pub image: String,
    pub runtime: String,
    pub mounts: Vec<Mount>,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Error,
}

/// What `WorkerPool::run` resolves with, win or lose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerOutput {
    pub status: RunOutcome,
    pub result: Option<serde_json::Value>,
    pub new_session_id: Option<String>,
    pub error: Option<String>,
}

impl ContainerOutput {
    pub fn ok(result: serde_json::Value, new_session_id: Option<String>) -> Self {
        Self { status: RunOutcome::Success, result: Some(result), new_session_id, error: None }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self { status: RunOutcome::Error, result: None, new_session_id: None, error: Some(message.into()) }
    }
}
