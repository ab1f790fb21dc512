use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    error::ChannelError,
    types::{ChannelStatus, InboundEvent, OutboundMessage},
};

/// Common interface implemented by a chat-platform client.
///
/// Implementations must be `Send + Sync` so they can be stored in a
/// [`ChannelManager`](crate::manager::ChannelManager) and driven from
/// multiple Tokio tasks.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable lowercase identifier for this channel (e.g. `"telegram"`).
    fn name(&self) -> &str;

    /// Establish the connection to the external service and start forwarding
    /// inbound events onto `events`.
    ///
    /// Implementations should transition their internal state to
    /// [`ChannelStatus::Connected`] on success.
    async fn connect(&mut self, events: mpsc::Sender<InboundEvent>) -> Result<(), ChannelError>;

    /// Gracefully close the connection.
    async fn disconnect(&mut self) -> Result<(), ChannelError>;

    /// Deliver a single outbound message. `&self` so a connected adapter can
    /// send concurrently without a mutable borrow.
    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError>;

    /// Deliver a reaction to a previously sent message.
    async fn send_reaction(&self, chat_id: outpost_core::types::ChatId, message_id: i64, emoji: &str) -> Result<(), ChannelError>;

    /// Return the current runtime status without blocking.
    fn status(&self) -> ChannelStatus;
}
