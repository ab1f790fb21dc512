use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a chat conversation on the external platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a topic within a chat. `0` means "no topic / general".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicId(pub i64);

impl TopicId {
    pub const GENERAL: TopicId = TopicId(0);

    pub fn is_general(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unique, slug-shaped workspace folder name.
///
/// `main` is the privileged admin workspace; `global` holds shared memory
/// visible read-only to every non-main workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceFolder(pub String);

impl WorkspaceFolder {
    pub const MAIN: &'static str = "main";
    pub const GLOBAL: &'static str = "global";

    pub fn main() -> Self {
        Self(Self::MAIN.to_string())
    }

    pub fn is_main(&self) -> bool {
        self.0 == Self::MAIN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WorkspaceFolder {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WorkspaceFolder {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Supervisor-issued identifier for a scheduled task (UUIDv7 — time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque session token handed back by a worker so it can resume context on
/// the next request to the same workspace. The supervisor never inspects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSessionToken(pub String);

impl fmt::Display for WorkerSessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of chat a conversation takes place in, as reported by the
/// external platform client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl fmt::Display for ChatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChatType::Private => "private",
            ChatType::Group => "group",
            ChatType::Supergroup => "supergroup",
            ChatType::Channel => "channel",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ChatType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "private" => Ok(ChatType::Private),
            "group" => Ok(ChatType::Group),
            "supergroup" => Ok(ChatType::Supergroup),
            "channel" => Ok(ChatType::Channel),
            other => Err(format!("unknown chat type: {other}")),
        }
    }
}

/// Policy deciding whether an incoming message causes a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    Always,
    Mention,
    Disabled,
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerMode::Always => "always",
            TriggerMode::Mention => "mention",
            TriggerMode::Disabled => "disabled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TriggerMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "always" => Ok(TriggerMode::Always),
            "mention" => Ok(TriggerMode::Mention),
            "disabled" => Ok(TriggerMode::Disabled),
            other => Err(format!("unknown trigger mode: {other}")),
        }
    }
}
