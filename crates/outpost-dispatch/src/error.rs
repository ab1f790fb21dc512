use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("store error: {0}")]
    Store(#[from] outpost_store::StoreError),

    #[error("registry error: {0}")]
    Registry(#[from] outpost_registry::RegistryError),

    #[error("mount planner error: {0}")]
    Mounts(#[from] outpost_mounts::MountError),

    #[error("session router error: {0}")]
    Router(#[from] outpost_router::RouterError),

    #[error("mailbox error: {0}")]
    Mailbox(#[from] outpost_mailbox::MailboxError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("workspace {0:?} has no bound topic")]
    UnknownWorkspace(String),

    #[error("chat {0:?} is not registered")]
    NotRegistered(i64),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
