//! Coalesces a burst of messages landing in the same workspace within a
//! short window into one flushed batch.

pub mod debouncer;
pub mod types;

pub use debouncer::Debouncer;
pub use types::{BufferedMessage, FlushedBatch, MULTI_SENDER_LABEL};
