//! The worker-to-supervisor side channel: a `messages/`+`tasks/` directory
//! pair per workspace that a worker writes to and the supervisor polls,
//! authorizes and applies.

pub mod authorize;
pub mod error;
pub mod handler;
pub mod poller;
pub mod scheduling;
pub mod snapshot;
pub mod types;

pub use authorize::Authorizer;
pub use error::{MailboxError, Result};
pub use handler::MailboxHandler;
pub use poller::MailboxPoller;
pub use scheduling::initial_next_run;
pub use types::{ChatsSnapshot, MessageAction, ServiceAction, TaskAction, TaskSnapshotEntry};
