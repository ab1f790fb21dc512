use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use outpost_core::types::ChatId;

use crate::{
    channel::Channel,
    error::ChannelError,
    types::{ChannelStatus, InboundEvent, OutboundMessage},
};

/// A chat-platform adapter that logs instead of speaking to a real service.
///
/// The actual chat platform client is an external collaborator this crate
/// only specifies an interface for — deployments wire in a real adapter
/// (Telegram, Discord, …) via [`crate::ChannelManager::register`]. This is
/// the extension point's default so the supervisor still runs end to end
/// with no platform configured.
pub struct NullChannel {
    status: std::sync::Mutex<ChannelStatus>,
}

impl NullChannel {
    pub fn new() -> Self {
        Self { status: std::sync::Mutex::new(ChannelStatus::Disconnected) }
    }
}

impl Default for NullChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for NullChannel {
    fn name(&self) -> &str {
        "null"
    }

    async fn connect(&mut self, _events: mpsc::Sender<InboundEvent>) -> Result<(), ChannelError> {
        *self.status.lock().unwrap() = ChannelStatus::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ChannelError> {
        *self.status.lock().unwrap() = ChannelStatus::Disconnected;
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        info!(chat_id = msg.chat_id.0, topic_id = msg.topic_id.0, content = %msg.content, "null channel: would send message");
        Ok(())
    }

    async fn send_reaction(&self, chat_id: ChatId, message_id: i64, emoji: &str) -> Result<(), ChannelError> {
        info!(chat_id = chat_id.0, message_id, emoji, "null channel: would send reaction");
        Ok(())
    }

    fn status(&self) -> ChannelStatus {
        self.status.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_reports_connected_status() {
        let mut channel = NullChannel::new();
        let (tx, _rx) = mpsc::channel(1);
        channel.connect(tx).await.unwrap();
        assert!(matches!(channel.status(), ChannelStatus::Connected));
    }

    #[tokio::test]
    async fn send_and_send_reaction_never_fail() {
        let channel = NullChannel::new();
        let msg = OutboundMessage {
            chat_id: ChatId(1),
            topic_id: outpost_core::types::TopicId::GENERAL,
            content: "hi".into(),
            format: crate::types::MessageFormat::PlainText,
            reply_to: None,
        };
        assert!(channel.send(&msg).await.is_ok());
        assert!(channel.send_reaction(ChatId(1), 1, "👍").await.is_ok());
    }
}
