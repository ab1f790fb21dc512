use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use outpost_core::types::{TaskId, WorkspaceFolder};
use outpost_registry::{DefaultTrigger, RegisteredChat};
use outpost_store::types::{ScheduledTask, TaskStatus};
use outpost_store::Store;

use crate::authorize::Authorizer;
use crate::error::{MailboxError, Result};
use crate::handler::MailboxHandler;
use crate::scheduling::initial_next_run;
use crate::types::{MessageAction, ServiceAction, TaskAction};

/// Polls every workspace's mailbox directory pair, authorizing and applying
/// whatever a worker dropped there. One tick handles every known workspace;
/// there is no cross-workspace ordering guarantee.
pub struct MailboxPoller {
    root: PathBuf,
    poll_interval: Duration,
    timezone: String,
    store: Arc<Store>,
    registry: Arc<outpost_registry::Registry>,
    handler: Arc<dyn MailboxHandler>,
}

impl MailboxPoller {
    pub fn new(
        root: impl Into<PathBuf>,
        poll_interval: Duration,
        timezone: String,
        store: Arc<Store>,
        registry: Arc<outpost_registry::Registry>,
        handler: Arc<dyn MailboxHandler>,
    ) -> Self {
        Self { root: root.into(), poll_interval, timezone, store, registry, handler }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("mailbox poller started");
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.poll_once().await {
                        error!("mailbox poll error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("mailbox poller shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Process every workspace directory once. Exposed directly for tests
    /// and for a caller that wants to force a drain outside the timer.
    pub async fn poll_once(&self) -> Result<()> {
        if !self.root.is_dir() {
            return Ok(());
        }
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut folders = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    folders.push(name.to_string());
                }
            }
        }
        folders.sort();

        for folder in folders {
            let source = WorkspaceFolder::from(folder.as_str());
            let workspace_dir = self.root.join(&folder);
            self.process_messages(&source, &workspace_dir.join("messages")).await?;
            self.process_tasks(&source, &workspace_dir.join("tasks")).await?;
        }
        Ok(())
    }

    async fn process_messages(&self, source: &WorkspaceFolder, dir: &Path) -> Result<()> {
        for path in list_json_files(dir).await? {
            let raw = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(?path, "cannot read mailbox message file: {e}");
                    continue;
                }
            };
            match serde_json::from_str::<MessageAction>(&raw) {
                Ok(action) => match self.apply_message_action(source, &action).await {
                    Ok(()) => tokio::fs::remove_file(&path).await?,
                    Err(reason) => {
                        warn!(?path, reason, "mailbox message action rejected");
                        move_to_errors(&path).await?;
                    }
                },
                Err(e) => {
                    warn!(?path, "unparseable mailbox message file: {e}");
                    move_to_errors(&path).await?;
                }
            }
        }
        Ok(())
    }

    async fn process_tasks(&self, source: &WorkspaceFolder, dir: &Path) -> Result<()> {
        for path in list_json_files(dir).await? {
            let raw = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(?path, "cannot read mailbox task file: {e}");
                    continue;
                }
            };
            match serde_json::from_str::<TaskAction>(&raw) {
                Ok(action) => match self.apply_task_action(source, &action).await {
                    Ok(()) => tokio::fs::remove_file(&path).await?,
                    Err(reason) => {
                        warn!(?path, reason, "mailbox task action rejected");
                        move_to_errors(&path).await?;
                    }
                },
                Err(e) => {
                    warn!(?path, "unparseable mailbox task file: {e}");
                    move_to_errors(&path).await?;
                }
            }
        }
        Ok(())
    }

    async fn apply_message_action(
        &self,
        source: &WorkspaceFolder,
        action: &MessageAction,
    ) -> std::result::Result<(), String> {
        let authorizer = Authorizer { store: &self.store };
        match action {
            MessageAction::Message { chat_id, topic_id, text, .. } => {
                if !authorizer.authorize_message(source, *chat_id).map_err(|e| e.to_string())? {
                    return Err(format!("workspace {source} may not message chat {chat_id}"));
                }
                self.handler.deliver_message(*chat_id, *topic_id, text).await;
                Ok(())
            }
            MessageAction::Reaction { chat_id, message_id, emoji, .. } => {
                if !authorizer.authorize_message(source, *chat_id).map_err(|e| e.to_string())? {
                    return Err(format!("workspace {source} may not react in chat {chat_id}"));
                }
                self.handler.deliver_reaction(*chat_id, *message_id, emoji).await;
                Ok(())
            }
        }
    }

    async fn apply_task_action(&self, source: &WorkspaceFolder, action: &TaskAction) -> std::result::Result<(), String> {
        match action {
            TaskAction::ScheduleTask {
                prompt,
                schedule_type,
                schedule_value,
                context_mode,
                chat_id,
                topic_id,
                folder,
                created_by: _,
            } => {
                let owner_folder = if source.is_main() {
                    folder.clone().unwrap_or_else(|| source.clone())
                } else {
                    source.clone()
                };
                let now = Utc::now();
                let next_run = initial_next_run(*schedule_type, schedule_value, &self.timezone, now)?;
                let task = ScheduledTask {
                    id: TaskId::new(),
                    chat_id: *chat_id,
                    topic_id: *topic_id,
                    folder: owner_folder,
                    prompt: prompt.clone(),
                    schedule_type: *schedule_type,
                    schedule_value: schedule_value.clone(),
                    context_mode: *context_mode,
                    next_run: Some(next_run.to_rfc3339()),
                    last_run: None,
                    last_result: None,
                    status: TaskStatus::Active,
                    created_at: now.to_rfc3339(),
                };
                self.store.create_task(&task).map_err(|e| e.to_string())
            }

            TaskAction::PauseTask { task_id } => self.set_task_status(source, task_id, TaskStatus::Paused).await,
            TaskAction::ResumeTask { task_id } => self.set_task_status(source, task_id, TaskStatus::Active).await,

            TaskAction::CancelTask { task_id } => {
                self.authorize_against_task(source, task_id)?;
                self.store.cancel_task(task_id).map_err(|e| e.to_string())
            }

            TaskAction::RegisterChat { chat_id, chat_type, chat_title, trigger_mode } => {
                if !source.is_main() {
                    return Err("register_chat is main-only".to_string());
                }
                let chat = RegisteredChat {
                    chat_id: *chat_id,
                    chat_type: *chat_type,
                    title: chat_title.clone(),
                    trigger: DefaultTrigger { mode: *trigger_mode, mention_pattern: None },
                    added_at: Utc::now().to_rfc3339(),
                    added_by: source.to_string(),
                    container_config: Default::default(),
                };
                self.registry.register(chat).map_err(|e| e.to_string())
            }

            TaskAction::ServiceControl { action } => {
                if !source.is_main() {
                    return Err("service_control is main-only".to_string());
                }
                self.handler.service_control(*action).await;
                Ok(())
            }
        }
    }

    async fn set_task_status(
        &self,
        source: &WorkspaceFolder,
        task_id: &TaskId,
        status: TaskStatus,
    ) -> std::result::Result<(), String> {
        self.authorize_against_task(source, task_id)?;
        self.store.set_task_status(task_id, status).map_err(|e| e.to_string())
    }

    fn authorize_against_task(&self, source: &WorkspaceFolder, task_id: &TaskId) -> std::result::Result<(), String> {
        let task = self
            .store
            .task(task_id)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("unknown task {task_id}"))?;
        let authorizer = Authorizer { store: &self.store };
        if authorizer.authorize_task_target(source, &task.folder) {
            Ok(())
        } else {
            Err(format!("workspace {source} may not act on task {task_id} owned by {}", task.folder))
        }
    }
}

async fn list_json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

async fn move_to_errors(path: &Path) -> Result<()> {
    let dir = path
        .parent()
        .and_then(Path::parent)
        .map(|p| p.join("errors"))
        .ok_or_else(|| MailboxError::Protocol(format!("{path:?} has no workspace parent")))?;
    tokio::fs::create_dir_all(&dir).await?;
    let file_name = path
        .file_name()
        .ok_or_else(|| MailboxError::Protocol(format!("{path:?} has no file name")))?;
    tokio::fs::rename(path, dir.join(file_name)).await?;
    Ok(())
}
