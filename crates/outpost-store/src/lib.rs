//! Durable collections backing the supervisor: chats, topics, messages,
//! scheduled tasks and their run history, persisted in a single SQLite
//! database.

pub mod db;
pub mod error;
pub mod manager;
pub mod types;

pub use error::{Result, StoreError};
pub use manager::Store;
