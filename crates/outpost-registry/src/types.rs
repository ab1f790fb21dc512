use serde::{Deserialize, Serialize};

use outpost_core::types::{ChatId, ChatType, TriggerMode};

/// Default trigger applied to a registered chat unless a topic overrides it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultTrigger {
    pub mode: TriggerMode,
    /// Substring matched case-insensitively when `mode == Mention`.
    /// Defaults to `@<assistant_name>` if absent.
    pub mention_pattern: Option<String>,
}

/// Per-chat overrides forwarded to the Worker Pool and Mount Planner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub extra_mounts: Vec<String>,
    pub timeout_secs: Option<u64>,
    pub env_overrides: Vec<(String, String)>,
}

/// A chat the supervisor is allowed to process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredChat {
    pub chat_id: ChatId,
    pub chat_type: ChatType,
    pub title: String,
    pub trigger: DefaultTrigger,
    pub added_at: String,
    pub added_by: String,
    #[serde(default)]
    pub container_config: ContainerConfig,
}
