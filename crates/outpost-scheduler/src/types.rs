use async_trait::async_trait;
use outpost_store::types::{RunStatus, ScheduledTask};

/// What one task execution produced, ready to fold into a `TaskRunLog`.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub status: RunStatus,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn ok(result: impl Into<String>) -> Self {
        Self { status: RunStatus::Success, result: Some(result.into()), error: None }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self { status: RunStatus::Error, result: None, error: Some(error.into()) }
    }

    /// The text recorded as `last_result` — the error if the run failed.
    pub fn summary(&self) -> String {
        self.error.clone().or_else(|| self.result.clone()).unwrap_or_default()
    }
}

/// Everything the scheduler delegates out: running a due task through the
/// Worker Pool and keeping the on-disk task snapshot current. Implemented
/// by the dispatch layer, which owns the Worker Pool and Mount Planner.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn execute_task(&self, task: &ScheduledTask) -> TaskOutcome;

    async fn write_task_snapshot(&self, folder: &str, tasks: &[ScheduledTask]);
}
