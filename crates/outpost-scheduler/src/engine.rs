use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use outpost_store::types::TaskStatus;
use outpost_store::Store;

use crate::error::Result;
use crate::schedule::compute_next_run;
use crate::types::TaskRunner;

/// Drives scheduled task execution at a fixed tick, delegating the actual
/// container run to a [`TaskRunner`] supplied by the dispatch layer.
pub struct SchedulerEngine {
    store: Arc<Store>,
    runner: Arc<dyn TaskRunner>,
    tick_interval: StdDuration,
    timezone: String,
}

impl SchedulerEngine {
    pub fn new(store: Arc<Store>, runner: Arc<dyn TaskRunner>, tick_interval: StdDuration, timezone: String) -> Self {
        Self { store, runner, tick_interval, timezone }
    }

    /// Main loop. Ticks until `shutdown` broadcasts `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("scheduler engine started");
        let mut interval = tokio::time::interval(self.tick_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("scheduler tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Process every task whose `next_run` has arrived.
    pub async fn tick(&self) -> Result<()> {
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let due = self.store.due_tasks(&now_str)?;
        for task in due {
            // Re-read to close the pause/cancel race between the due-list
            // query above and actually running this task.
            let Some(current) = self.store.task(&task.id)? else { continue };
            if current.status != TaskStatus::Active {
                continue;
            }

            let mut folder_tasks = self.store.tasks_for_folder(current.folder.as_str())?;
            if let Some(slot) = folder_tasks.iter_mut().find(|t| t.id == current.id) {
                *slot = current.clone();
            }
            self.runner.write_task_snapshot(current.folder.as_str(), &folder_tasks).await;

            let outcome = self.runner.execute_task(&current).await;

            let next_run = match compute_next_run(current.schedule_type, &current.schedule_value, &self.timezone, now)
            {
                Ok(next) => next.map(|dt| dt.to_rfc3339()),
                Err(e) => {
                    warn!(task_id = %current.id, "failed to compute next run, completing task: {e}");
                    None
                }
            };

            self.store.update_after_run(
                &current.id,
                &now_str,
                next_run.as_deref(),
                &outcome.summary(),
            )?;

            self.store.log_run(&outpost_store::types::TaskRunLog {
                id: 0,
                task_id: current.id.clone(),
                run_at: now_str.clone(),
                duration_ms: 0,
                status: outcome.status,
                result: outcome.result.clone(),
                error: outcome.error.clone(),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use outpost_core::types::{ChatId, TaskId, TopicId, WorkspaceFolder};
    use outpost_store::types::{ContextMode, ScheduleType, ScheduledTask};
    use rusqlite::Connection;

    use crate::types::TaskOutcome;

    struct FakeRunner {
        calls: Mutex<Vec<String>>,
    }

    impl FakeRunner {
        fn new() -> Self {
            Self { calls: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl TaskRunner for FakeRunner {
        async fn execute_task(&self, task: &ScheduledTask) -> TaskOutcome {
            self.calls.lock().unwrap().push(task.id.as_str().to_string());
            TaskOutcome::ok("did the thing")
        }

        async fn write_task_snapshot(&self, _folder: &str, _tasks: &[ScheduledTask]) {}
    }

    fn new_store() -> Arc<Store> {
        let conn = Connection::open_in_memory().unwrap();
        outpost_store::db::init_db(&conn).unwrap();
        Arc::new(Store::new(conn))
    }

    fn sample_task(due: &str, schedule_type: ScheduleType, schedule_value: &str) -> ScheduledTask {
        ScheduledTask {
            id: TaskId::new(),
            chat_id: ChatId(1),
            topic_id: TopicId::GENERAL,
            folder: WorkspaceFolder("main".into()),
            prompt: "check the weather".into(),
            schedule_type,
            schedule_value: schedule_value.into(),
            context_mode: ContextMode::Isolated,
            next_run: Some(due.into()),
            last_run: None,
            last_result: None,
            status: TaskStatus::Active,
            created_at: due.into(),
        }
    }

    #[tokio::test]
    async fn tick_runs_due_tasks_and_completes_once_tasks() {
        let store = new_store();
        let task = sample_task("2020-01-01T00:00:00Z", ScheduleType::Once, "");
        store.create_task(&task).unwrap();

        let runner = Arc::new(FakeRunner::new());
        let engine = SchedulerEngine::new(store.clone(), runner.clone(), StdDuration::from_secs(60), "UTC".into());
        engine.tick().await.unwrap();

        assert_eq!(runner.calls.lock().unwrap().len(), 1);
        let reloaded = store.task(&task.id).unwrap().unwrap();
        assert_eq!(reloaded.status, TaskStatus::Completed);
        assert_eq!(reloaded.next_run, None);
        assert_eq!(reloaded.last_result.as_deref(), Some("did the thing"));
    }

    #[tokio::test]
    async fn tick_reschedules_interval_tasks() {
        let store = new_store();
        let task = sample_task("2020-01-01T00:00:00Z", ScheduleType::Interval, "60000");
        store.create_task(&task).unwrap();

        let runner = Arc::new(FakeRunner::new());
        let engine = SchedulerEngine::new(store.clone(), runner, StdDuration::from_secs(60), "UTC".into());
        engine.tick().await.unwrap();

        let reloaded = store.task(&task.id).unwrap().unwrap();
        assert_eq!(reloaded.status, TaskStatus::Active);
        assert!(reloaded.next_run.is_some());
    }

    #[tokio::test]
    async fn tick_skips_tasks_paused_since_the_due_query() {
        let store = new_store();
        let task = sample_task("2020-01-01T00:00:00Z", ScheduleType::Once, "");
        store.create_task(&task).unwrap();
        store.set_task_status(&task.id, TaskStatus::Paused).unwrap();

        let runner = Arc::new(FakeRunner::new());
        let engine = SchedulerEngine::new(store.clone(), runner.clone(), StdDuration::from_secs(60), "UTC".into());
        engine.tick().await.unwrap();

        assert!(runner.calls.lock().unwrap().is_empty());
    }
}
