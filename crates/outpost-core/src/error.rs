use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutpostError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("channel error ({channel}): {reason}")]
    Channel { channel: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl OutpostError {
    /// Short error code used in logs and task-run records.
    pub fn code(&self) -> &'static str {
        match self {
            OutpostError::Config(_) => "CONFIG_ERROR",
            OutpostError::Database(_) => "DATABASE_ERROR",
            OutpostError::Channel { .. } => "CHANNEL_ERROR",
            OutpostError::Serialization(_) => "SERIALIZATION_ERROR",
            OutpostError::Io(_) => "IO_ERROR",
            OutpostError::Timeout { .. } => "TIMEOUT",
            OutpostError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, OutpostError>;
