use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("I/O error talking to worker: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker for workspace {workspace:?} did not signal readiness within the timeout")]
    ReadinessTimeout { workspace: String },

    #[error("request to workspace {workspace:?} exceeded its deadline")]
    RequestTimeout { workspace: String },

    #[error("worker exited unexpectedly before replying: {0}")]
    UnexpectedExit(String),

    #[error("could not parse worker output: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, PoolError>;
