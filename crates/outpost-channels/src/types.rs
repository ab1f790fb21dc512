use serde::{Deserialize, Serialize};

use outpost_core::types::{ChatId, ChatType, TopicId};

/// A message or reaction received from the chat platform, handed to the
/// Session Router before it reaches the Store. Field shape mirrors
/// `outpost_store::types::Message` so translating one into the other is a
/// direct copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub chat_id: ChatId,
    pub chat_type: ChatType,
    pub chat_title: String,
    pub topic_id: TopicId,
    pub message_id: i64,
    pub sender_id: String,
    pub sender_name: String,
    pub is_bot: bool,
    pub timestamp: String,
    pub content: String,
    pub reply_to: Option<i64>,
    pub reaction_emoji: Option<String>,
    /// `"added"` or `"removed"`; absent for plain text messages.
    pub reaction_action: Option<String>,
    pub target_message_id: Option<i64>,
}

/// A message to be delivered to the chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub chat_id: ChatId,
    pub topic_id: TopicId,
    pub content: String,
    pub format: MessageFormat,
    /// Reply-to target: the newest inbound message that triggered this dispatch.
    pub reply_to: Option<i64>,
}

/// Formatting hint for outbound message content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageFormat {
    /// Raw text with no special markup.
    #[default]
    PlainText,

    /// Markdown as understood by the target platform.
    Markdown,

    /// HTML markup (supported by Telegram, some web clients).
    Html,
}

/// Runtime connection state of a channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    /// Fully connected and ready to send/receive.
    Connected,

    /// Attempting to establish or re-establish the connection.
    Connecting,

    /// Cleanly disconnected (not an error condition).
    Disconnected,

    /// An unrecoverable (or pre-retry) error occurred.
    Error(String),
}
