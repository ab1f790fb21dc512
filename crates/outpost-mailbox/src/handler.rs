use async_trait::async_trait;

use outpost_core::types::{ChatId, TopicId};

use crate::types::ServiceAction;

/// The side of a mailbox action that crosses into the chat platform or the
/// process itself — capabilities the mailbox poller doesn't own, supplied
/// by the dispatch layer.
#[async_trait]
pub trait MailboxHandler: Send + Sync {
    async fn deliver_message(&self, chat_id: ChatId, topic_id: TopicId, text: &str);

    async fn deliver_reaction(&self, chat_id: ChatId, message_id: i64, emoji: &str);

    async fn service_control(&self, action: ServiceAction);
}
