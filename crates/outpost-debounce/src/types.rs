use chrono::{DateTime, Utc};

/// A single message appended to a workspace's pending buffer.
#[derive(Debug, Clone)]
pub struct BufferedMessage {
    pub sender: String,
    pub content: String,
    pub message_id: i64,
    pub reply_to: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

/// The merged result of one workspace's buffer firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushedBatch {
    pub content: String,
    pub sender_label: String,
    pub reply_to: i64,
}

/// The literal sender label used when a batch mixes more than one sender.
pub const MULTI_SENDER_LABEL: &str = "multiple";
