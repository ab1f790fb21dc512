//! Tracks which chats the supervisor is allowed to process and decides
//! whether a given message should trigger a dispatch.

pub mod error;
pub mod registry;
pub mod types;

pub use error::{RegistryError, Result};
pub use registry::{evaluate_trigger, Registry};
pub use types::{ContainerConfig, DefaultTrigger, RegisteredChat};
