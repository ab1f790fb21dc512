//! Maps every (chat, topic) ever observed onto a unique workspace folder,
//! and tracks the opaque worker session token each workspace last handed
//! back.

pub mod error;
pub mod sessions;
pub mod slug;

pub use error::{RouterError, Result};
pub use sessions::WorkspaceSessions;
pub use slug::{assign_folder, slug as slugify};
