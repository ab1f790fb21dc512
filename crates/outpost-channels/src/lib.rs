//! The external chat-platform client interface: a `Channel` trait any
//! platform adapter implements, and a manager that connects, reconnects,
//! and fans inbound events from every registered adapter into one stream.

pub mod channel;
pub mod error;
pub mod manager;
pub mod null_channel;
pub mod types;

pub use channel::Channel;
pub use error::ChannelError;
pub use manager::ChannelManager;
pub use null_channel::NullChannel;
pub use types::{ChannelStatus, InboundEvent, MessageFormat, OutboundMessage};
