use serde::{Deserialize, Serialize};

use outpost_core::types::{ChatId, ChatType, TaskId, TopicId, TriggerMode, WorkspaceFolder};

/// A chat conversation as observed on the external platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub chat_id: ChatId,
    pub chat_type: ChatType,
    pub title: String,
    pub last_activity: String,
}

/// A topic within a chat, bound permanently to a workspace folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub chat_id: ChatId,
    pub topic_id: TopicId,
    pub name: String,
    pub folder: WorkspaceFolder,
    pub trigger_mode: TriggerMode,
    pub last_activity: String,
}

/// The kind of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Reaction,
    AgentResponse,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageType::Text => "text",
            MessageType::Reaction => "reaction",
            MessageType::AgentResponse => "agent_response",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "reaction" => Ok(MessageType::Reaction),
            "agent_response" => Ok(MessageType::AgentResponse),
            other => Err(format!("unknown message type: {other}")),
        }
    }
}

/// A single message in a (chat, topic) conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub chat_id: ChatId,
    pub topic_id: TopicId,
    pub id: i64,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub message_type: MessageType,
    pub timestamp: String,
    pub is_bot: bool,
    pub reply_to: Option<i64>,
    pub reaction_emoji: Option<String>,
    pub reaction_action: Option<String>,
    pub target_message_id: Option<i64>,
    pub worker_session_id: Option<String>,
}

/// How a scheduled task re-computes its next run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Cron,
    Interval,
    Once,
}

impl std::fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScheduleType::Cron => "cron",
            ScheduleType::Interval => "interval",
            ScheduleType::Once => "once",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ScheduleType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cron" => Ok(ScheduleType::Cron),
            "interval" => Ok(ScheduleType::Interval),
            "once" => Ok(ScheduleType::Once),
            other => Err(format!("unknown schedule type: {other}")),
        }
    }
}

/// Whether a scheduled run reuses the workspace's live worker session or
/// starts fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    Group,
    Isolated,
}

impl std::fmt::Display for ContextMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContextMode::Group => "group",
            ContextMode::Isolated => "isolated",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ContextMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "group" => Ok(ContextMode::Group),
            "isolated" => Ok(ContextMode::Isolated),
            other => Err(format!("unknown context mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Paused,
    Completed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Active => "active",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TaskStatus::Active),
            "paused" => Ok(TaskStatus::Paused),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A user- or agent-created scheduled task bound to one workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub chat_id: ChatId,
    pub topic_id: TopicId,
    pub folder: WorkspaceFolder,
    pub prompt: String,
    pub schedule_type: ScheduleType,
    pub schedule_value: String,
    pub context_mode: ContextMode,
    pub next_run: Option<String>,
    pub last_run: Option<String>,
    pub last_result: Option<String>,
    pub status: TaskStatus,
    pub created_at: String,
}

/// Append-only record of one task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunLog {
    pub id: i64,
    pub task_id: TaskId,
    pub run_at: String,
    pub duration_ms: u64,
    pub status: RunStatus,
    pub result: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(RunStatus::Success),
            "error" => Ok(RunStatus::Error),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}
