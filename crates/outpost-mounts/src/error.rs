use thiserror::Error;

#[derive(Debug, Error)]
pub enum MountError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid glob pattern {pattern:?}: {reason}")]
    BadPattern { pattern: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MountError>;
