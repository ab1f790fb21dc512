use serde::{Deserialize, Serialize};

use outpost_core::types::{ChatId, ChatType, TaskId, TopicId, TriggerMode, WorkspaceFolder};
use outpost_store::types::{ContextMode, ScheduleType};

/// Outbound chat actions a worker drops in its `messages/` directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageAction {
    Message { chat_id: ChatId, topic_id: TopicId, text: String, folder: WorkspaceFolder, timestamp: String },
    Reaction { chat_id: ChatId, message_id: i64, emoji: String, folder: WorkspaceFolder, timestamp: String },
}

/// Task and administrative actions a worker drops in its `tasks/` directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskAction {
    ScheduleTask {
        prompt: String,
        schedule_type: ScheduleType,
        schedule_value: String,
        context_mode: ContextMode,
        chat_id: ChatId,
        topic_id: TopicId,
        /// Main-only: assign the task to a folder other than the source workspace.
        #[serde(default)]
        folder: Option<WorkspaceFolder>,
        created_by: String,
    },
    PauseTask { task_id: TaskId },
    ResumeTask { task_id: TaskId },
    CancelTask { task_id: TaskId },
    RegisterChat { chat_id: ChatId, chat_type: ChatType, chat_title: String, trigger_mode: TriggerMode },
    ServiceControl { action: ServiceAction },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceAction {
    Restart,
    Rebuild,
}

/// One entry of `current_tasks.json`, in the shape the worker expects.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshotEntry {
    pub id: String,
    pub folder: String,
    pub prompt: String,
    #[serde(rename = "scheduleType")]
    pub schedule_type: String,
    #[serde(rename = "scheduleValue")]
    pub schedule_value: String,
    pub status: String,
    #[serde(rename = "nextRun")]
    pub next_run: Option<String>,
}

/// The full shape of `available_chats.json`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatsSnapshot {
    pub chats: Vec<outpost_registry::RegisteredChat>,
    #[serde(rename = "lastSync")]
    pub last_sync: String,
}
