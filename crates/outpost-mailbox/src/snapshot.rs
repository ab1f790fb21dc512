use std::path::Path;

use outpost_registry::RegisteredChat;
use outpost_store::types::ScheduledTask;

use crate::error::Result;
use crate::types::{ChatsSnapshot, TaskSnapshotEntry};

/// Write `current_tasks.json` into a workspace's mailbox dir. `main` sees
/// every task; any other workspace sees only its own.
pub async fn write_current_tasks(dir: &Path, tasks: &[ScheduledTask]) -> Result<()> {
    let entries: Vec<TaskSnapshotEntry> = tasks
        .iter()
        .map(|t| TaskSnapshotEntry {
            id: t.id.as_str().to_string(),
            folder: t.folder.as_str().to_string(),
            prompt: t.prompt.clone(),
            schedule_type: t.schedule_type.to_string(),
            schedule_value: t.schedule_value.clone(),
            status: t.status.to_string(),
            next_run: t.next_run.clone(),
        })
        .collect();
    write_atomic(&dir.join("current_tasks.json"), &serde_json::to_string_pretty(&entries)?).await
}

/// Write `available_chats.json`. `main` sees the full registry; any other
/// workspace sees an empty list.
pub async fn write_available_chats(dir: &Path, chats: &[RegisteredChat], last_sync: &str) -> Result<()> {
    let snapshot = ChatsSnapshot { chats: chats.to_vec(), last_sync: last_sync.to_string() };
    write_atomic(&dir.join("available_chats.json"), &serde_json::to_string_pretty(&snapshot)?).await
}

async fn write_atomic(path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_core::types::{ChatId, ChatType, TaskId, TopicId, WorkspaceFolder};
    use outpost_registry::{ContainerConfig, DefaultTrigger};
    use outpost_core::types::TriggerMode;
    use outpost_store::types::{ContextMode, ScheduleType, TaskStatus};

    #[tokio::test]
    async fn current_tasks_round_trips_through_atomic_write() {
        let dir = tempfile::tempdir().unwrap();
        let task = ScheduledTask {
            id: TaskId::new(),
            chat_id: ChatId(1),
            topic_id: TopicId::GENERAL,
            folder: WorkspaceFolder::main(),
            prompt: "check the weather".into(),
            schedule_type: ScheduleType::Interval,
            schedule_value: "60000".into(),
            context_mode: ContextMode::Isolated,
            next_run: Some("2026-01-01T00:01:00Z".into()),
            last_run: None,
            last_result: None,
            status: TaskStatus::Active,
            created_at: "2026-01-01T00:00:00Z".into(),
        };
        write_current_tasks(dir.path(), std::slice::from_ref(&task)).await.unwrap();

        let body = tokio::fs::read_to_string(dir.path().join("current_tasks.json")).await.unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed[0]["scheduleValue"], "60000");
        assert_eq!(parsed[0]["nextRun"], "2026-01-01T00:01:00Z");
    }

    #[tokio::test]
    async fn available_chats_carries_last_sync() {
        let dir = tempfile::tempdir().unwrap();
        let chat = RegisteredChat {
            chat_id: ChatId(1),
            chat_type: ChatType::Group,
            title: "Family".into(),
            trigger: DefaultTrigger { mode: TriggerMode::Always, mention_pattern: None },
            added_at: "2026-01-01T00:00:00Z".into(),
            added_by: "main".into(),
            container_config: ContainerConfig::default(),
        };
        write_available_chats(dir.path(), std::slice::from_ref(&chat), "2026-01-01T00:05:00Z").await.unwrap();

        let body = tokio::fs::read_to_string(dir.path().join("available_chats.json")).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["lastSync"], "2026-01-01T00:05:00Z");
        assert_eq!(parsed["chats"][0]["chat_id"], 1);
    }
}
