use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use outpost_channels::{Channel, OutboundMessage};
use outpost_core::types::{ChatId, ChatType, TopicId, WorkspaceFolder};
use outpost_mailbox::{MailboxHandler, ServiceAction};
use outpost_mounts::{plan_mounts, MountRequest};
use outpost_pool::{ContainerOutput, Job, RunOutcome, WorkerPool};
use outpost_registry::Registry;
use outpost_router::WorkspaceSessions;
use outpost_scheduler::{TaskOutcome, TaskRunner};
use outpost_store::types::{ContextMode, RunStatus, ScheduledTask};
use outpost_store::Store;

use crate::config::DispatchConfig;
use crate::error::{DispatchError, Result};
use crate::prompt::{build_messages_prompt, build_reaction_prompt};
use crate::timestamps::AgentTimestamps;

fn mailbox_dir(root: &std::path::Path, folder: &str) -> PathBuf {
    root.join("mailbox").join(folder)
}

/// Bridges the Scheduler and Mailbox's pure logic into the real Worker
/// Pool, Mount Planner, and chat-platform client — the seam every other
/// component's trait (`TaskRunner`, `MailboxHandler`) is implemented
/// against.
pub struct DispatchCore {
    store: Arc<Store>,
    registry: Arc<Registry>,
    sessions: Arc<WorkspaceSessions>,
    timestamps: Arc<AgentTimestamps>,
    pool: Arc<WorkerPool>,
    channel: Arc<dyn Channel + Send + Sync>,
    config: DispatchConfig,
}

impl DispatchCore {
    pub fn new(
        store: Arc<Store>,
        registry: Arc<Registry>,
        sessions: Arc<WorkspaceSessions>,
        timestamps: Arc<AgentTimestamps>,
        pool: Arc<WorkerPool>,
        channel: Arc<dyn Channel + Send + Sync>,
        config: DispatchConfig,
    ) -> Self {
        Self { store, registry, sessions, timestamps, pool, channel, config }
    }

    fn mailbox_dir(&self, folder: &str) -> PathBuf {
        mailbox_dir(&self.config.project_root, folder)
    }

    async fn write_snapshots(&self, folder: &str, is_main: bool) -> Result<()> {
        let dir = self.mailbox_dir(folder);
        let tasks = if is_main { self.store.all_tasks()? } else { self.store.tasks_for_folder(folder)? };
        outpost_mailbox::snapshot::write_current_tasks(&dir, &tasks).await?;

        let chats = if is_main { self.registry.list() } else { Vec::new() };
        let last_sync = Utc::now().to_rfc3339();
        outpost_mailbox::snapshot::write_available_chats(&dir, &chats, &last_sync).await?;
        Ok(())
    }

    fn build_job(
        &self,
        folder: &str,
        is_main: bool,
        chat_type: ChatType,
        prompt: String,
        session_id: Option<String>,
        is_scheduled_task: bool,
        extra_mounts: &[String],
        timeout_secs: u64,
    ) -> Result<Job> {
        let plan = plan_mounts(&MountRequest {
            project_root: &self.config.project_root,
            workspace_folder: folder,
            is_main,
            chat_type,
            extra_mounts,
            allowlist: &self.config.allowlist,
            non_main_read_only: self.config.non_main_read_only,
        })?;

        let mut input = serde_json::json!({
            "prompt": prompt,
            "folder": folder,
            "session_key": folder,
            "is_main": is_main,
        });
        if let Some(sid) = session_id {
            input["session_id"] = serde_json::Value::String(sid);
        }
        if is_scheduled_task {
            input["is_scheduled_task"] = serde_json::Value::Bool(true);
        }
        input["chat_type"] = serde_json::Value::String(chat_type.to_string());

        Ok(Job {
            workspace: folder.to_string(),
            is_main,
            input,
            image: self.config.container_image.clone(),
            runtime: self.config.container_runtime.clone(),
            mounts: plan.mounts,
            env: Vec::new(),
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Steps 1–7 of the Dispatch Core algorithm: fired when the Debouncer
    /// flushes buffered text for workspace `folder`.
    pub async fn dispatch_text(&self, folder: &str) -> Result<()> {
        let Some(topic) = self.store.topic_by_folder(folder)? else {
            return Err(DispatchError::UnknownWorkspace(folder.to_string()));
        };
        let is_main = folder == WorkspaceFolder::MAIN;

        let chat_type = if is_main {
            self.store.chat(topic.chat_id)?.map(|c| c.chat_type).unwrap_or(ChatType::Private)
        } else {
            let Some(chat) = self.registry.get(topic.chat_id) else {
                info!(folder, "chat no longer registered, dropping dispatch");
                return Ok(());
            };
            chat.chat_type
        };

        let since = self.timestamps.get_or_epoch(folder);
        let exclude_prefix = format!("{}:", self.config.assistant_name);
        let messages = self.store.messages_since(topic.chat_id, topic.topic_id, &since, Some(&exclude_prefix))?;
        if messages.is_empty() {
            return Ok(());
        }

        let prompt = build_messages_prompt(&messages);
        self.write_snapshots(folder, is_main).await?;

        let container = self.registry.get(topic.chat_id);
        let extra_mounts = container.as_ref().map(|c| c.container_config.extra_mounts.clone()).unwrap_or_default();
        let timeout_secs = container
            .as_ref()
            .and_then(|c| c.container_config.timeout_secs)
            .unwrap_or(self.config.default_timeout_secs);

        let session_id = self.sessions.get(folder);
        let job = self.build_job(folder, is_main, chat_type, prompt, session_id, false, &extra_mounts, timeout_secs)?;
        let output = self.pool.run(job).await;

        self.finish_dispatch(folder, &topic, &messages, output).await
    }

    /// The reaction-triggered variant of dispatch: an inbound reaction on a
    /// bot-authored message, or any reaction when the chat's trigger is
    /// `always`. Executes the same pool call, minus a reply-to target.
    pub async fn dispatch_reaction(
        &self,
        folder: &str,
        chat_id: ChatId,
        reactor: &str,
        emoji: &str,
        target_message_id: i64,
    ) -> Result<()> {
        let Some(topic) = self.store.topic_by_folder(folder)? else {
            return Err(DispatchError::UnknownWorkspace(folder.to_string()));
        };
        let is_main = folder == WorkspaceFolder::MAIN;

        let chat_type = if is_main {
            ChatType::Private
        } else {
            let Some(chat) = self.registry.get(chat_id) else {
                info!(folder, "chat no longer registered, dropping reaction dispatch");
                return Ok(());
            };
            chat.chat_type
        };

        let prompt = build_reaction_prompt(reactor, emoji, target_message_id);
        self.write_snapshots(folder, is_main).await?;

        let container = self.registry.get(chat_id);
        let extra_mounts = container.as_ref().map(|c| c.container_config.extra_mounts.clone()).unwrap_or_default();
        let timeout_secs = container
            .as_ref()
            .and_then(|c| c.container_config.timeout_secs)
            .unwrap_or(self.config.default_timeout_secs);

        let session_id = self.sessions.get(folder);
        let job = self.build_job(folder, is_main, chat_type, prompt, session_id, false, &extra_mounts, timeout_secs)?;
        let output = self.pool.run(job).await;

        self.finish_dispatch(folder, &topic, &[], output).await
    }

    /// Shared tail of both dispatch paths: persist the returned session,
    /// and on success, advance the watermark and reply on the chat platform.
    async fn finish_dispatch(
        &self,
        folder: &str,
        topic: &outpost_store::types::Topic,
        inbound: &[outpost_store::types::Message],
        output: ContainerOutput,
    ) -> Result<()> {
        if let Some(new_session_id) = output.new_session_id {
            self.sessions.set(folder, new_session_id)?;
        }

        if output.status != RunOutcome::Success {
            warn!(folder, error = ?output.error, "worker run failed, abandoning reply");
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();
        self.timestamps.set(folder, now)?;

        let Some(result) = output.result else { return Ok(()) };
        let text = match &result {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if text.trim().is_empty() {
            return Ok(());
        }

        let reply_to = inbound.iter().map(|m| m.id).max();
        let outbound = OutboundMessage {
            chat_id: topic.chat_id,
            topic_id: topic.topic_id,
            content: format!("{}: {}", self.config.assistant_name, text),
            format: outpost_channels::MessageFormat::PlainText,
            reply_to,
        };
        if let Err(e) = self.channel.send(&outbound).await {
            warn!(folder, error = %e, "chat platform egress failed; watermark already advanced");
        }
        Ok(())
    }
}

#[async_trait]
impl TaskRunner for DispatchCore {
    async fn execute_task(&self, task: &ScheduledTask) -> TaskOutcome {
        let folder = task.folder.as_str();
        let is_main = task.folder.is_main();

        let chat_type = self
            .registry
            .get(task.chat_id)
            .map(|c| c.chat_type)
            .or_else(|| self.store.chat(task.chat_id).ok().flatten().map(|c| c.chat_type))
            .unwrap_or(ChatType::Private);

        let session_id = if task.context_mode == ContextMode::Group { self.sessions.get(folder) } else { None };

        let container = self.registry.get(task.chat_id);
        let extra_mounts = container.as_ref().map(|c| c.container_config.extra_mounts.clone()).unwrap_or_default();
        let timeout_secs = container
            .as_ref()
            .and_then(|c| c.container_config.timeout_secs)
            .unwrap_or(self.config.default_timeout_secs);

        let job = match self.build_job(
            folder,
            is_main,
            chat_type,
            task.prompt.clone(),
            session_id,
            true,
            &extra_mounts,
            timeout_secs,
        ) {
            Ok(job) => job,
            Err(e) => return TaskOutcome::err(format!("failed to build job: {e}")),
        };

        let output = self.pool.run(job).await;

        if let Some(new_session_id) = output.new_session_id {
            if task.context_mode == ContextMode::Group {
                if let Err(e) = self.sessions.set(folder, new_session_id) {
                    warn!(folder, error = %e, "failed to persist task session id");
                }
            }
        }

        match output.status {
            RunOutcome::Success => {
                let text = output
                    .result
                    .map(|r| match r {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .unwrap_or_default();
                TaskOutcome::ok(text)
            }
            RunOutcome::Error => TaskOutcome::err(output.error.unwrap_or_else(|| "worker run failed".to_string())),
        }
    }

    async fn write_task_snapshot(&self, folder: &str, tasks: &[ScheduledTask]) {
        let dir = self.mailbox_dir(folder);
        let snapshot_tasks = if folder == WorkspaceFolder::MAIN {
            match self.store.all_tasks() {
                Ok(all) => all,
                Err(e) => {
                    warn!(folder, error = %e, "failed to load full task list for main snapshot");
                    tasks.to_vec()
                }
            }
        } else {
            tasks.to_vec()
        };
        if let Err(e) = outpost_mailbox::snapshot::write_current_tasks(&dir, &snapshot_tasks).await {
            warn!(folder, error = %e, "failed to write task snapshot");
        }
    }
}

#[async_trait]
impl MailboxHandler for DispatchCore {
    async fn deliver_message(&self, chat_id: ChatId, topic_id: TopicId, text: &str) {
        let outbound = OutboundMessage {
            chat_id,
            topic_id,
            content: format!("{}: {}", self.config.assistant_name, text),
            format: outpost_channels::MessageFormat::PlainText,
            reply_to: None,
        };
        if let Err(e) = self.channel.send(&outbound).await {
            warn!(chat_id = chat_id.0, error = %e, "failed to deliver mailbox message");
        }
    }

    async fn deliver_reaction(&self, chat_id: ChatId, message_id: i64, emoji: &str) {
        if let Err(e) = self.channel.send_reaction(chat_id, message_id, emoji).await {
            warn!(chat_id = chat_id.0, message_id, error = %e, "failed to deliver mailbox reaction");
        }
    }

    async fn service_control(&self, action: ServiceAction) {
        match action {
            ServiceAction::Restart => {
                info!("restart requested; exiting after grace period");
                tokio::time::sleep(self.config.restart_grace).await;
                std::process::exit(0);
            }
            ServiceAction::Rebuild => {
                info!(command = ?self.config.build_command, "rebuild requested");
                let Some((program, args)) = self.config.build_command.split_first() else {
                    warn!("no build command configured, ignoring rebuild request");
                    return;
                };
                let status = tokio::process::Command::new(program)
                    .args(args)
                    .current_dir(&self.config.project_root)
                    .status()
                    .await;
                match status {
                    Ok(status) if status.success() => {
                        info!("rebuild succeeded, exiting");
                        std::process::exit(0);
                    }
                    Ok(status) => {
                        warn!(code = ?status.code(), "rebuild command exited non-zero, not restarting");
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to spawn rebuild command");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_core::types::{ChatType as CoreChatType, TopicId as CoreTopicId};
    use outpost_mounts::Allowlist;
    use outpost_store::db::init_db;
    use outpost_store::types::{Chat, Topic};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;

    fn test_store() -> Arc<Store> {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        Arc::new(Store::new(conn))
    }

    fn test_registry(dir: &std::path::Path) -> Arc<Registry> {
        Arc::new(Registry::load(dir.join("registry.json")).unwrap())
    }

    struct RecordingChannel {
        sent: StdMutex<Vec<OutboundMessage>>,
        reactions: AtomicUsize,
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }
        async fn connect(&mut self, _events: mpsc::Sender<outpost_channels::InboundEvent>) -> std::result::Result<(), outpost_channels::ChannelError> {
            Ok(())
        }
        async fn disconnect(&mut self) -> std::result::Result<(), outpost_channels::ChannelError> {
            Ok(())
        }
        async fn send(&self, msg: &OutboundMessage) -> std::result::Result<(), outpost_channels::ChannelError> {
            self.sent.lock().unwrap().push(msg.clone());
            Ok(())
        }
        async fn send_reaction(&self, _chat_id: ChatId, _message_id: i64, _emoji: &str) -> std::result::Result<(), outpost_channels::ChannelError> {
            self.reactions.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn status(&self) -> outpost_channels::ChannelStatus {
            outpost_channels::ChannelStatus::Connected
        }
    }

    fn test_config(project_root: &std::path::Path) -> DispatchConfig {
        DispatchConfig {
            assistant_name: "Nanomi".into(),
            project_root: project_root.to_path_buf(),
            non_main_read_only: true,
            allowlist: Allowlist::default(),
            container_image: "outpost-worker:latest".into(),
            container_runtime: "docker".into(),
            default_timeout_secs: 300,
            build_command: vec!["true".into()],
            restart_grace: Duration::from_millis(1),
        }
    }

    fn setup(project_root: &std::path::Path) -> (Arc<Store>, Arc<Registry>, Arc<WorkspaceSessions>, Arc<AgentTimestamps>) {
        std::fs::create_dir_all(project_root.join("workspaces/family-chat")).unwrap();
        std::fs::create_dir_all(project_root.join("workspaces/main")).unwrap();
        let store = test_store();
        let registry = test_registry(project_root);
        let sessions = Arc::new(WorkspaceSessions::load(project_root.join("sessions.json")).unwrap());
        let timestamps = Arc::new(AgentTimestamps::load(project_root.join("timestamps.json")).unwrap());
        (store, registry, sessions, timestamps)
    }

    #[test]
    fn build_job_embeds_session_key_and_folder() {
        let dir = tempfile::tempdir().unwrap();
        let (store, registry, sessions, timestamps) = setup(dir.path());
        let pool = Arc::new(WorkerPool::new(outpost_core::config::PoolConfig::default()));
        let channel: Arc<dyn Channel + Send + Sync> =
            Arc::new(RecordingChannel { sent: StdMutex::new(Vec::new()), reactions: AtomicUsize::new(0) });
        let core = DispatchCore::new(store, registry, sessions, timestamps, pool, channel, test_config(dir.path()));

        let job = core
            .build_job("family-chat", false, CoreChatType::Group, "hello".into(), None, false, &[], 60)
            .unwrap();
        assert_eq!(job.workspace, "family-chat");
        assert_eq!(job.input["session_key"], "family-chat");
        assert_eq!(job.input["folder"], "family-chat");
        assert_eq!(job.input["is_main"], false);
        assert!(job.input.get("session_id").is_none());
    }

    #[tokio::test]
    async fn dispatch_text_drops_silently_when_chat_unregistered() {
        let dir = tempfile::tempdir().unwrap();
        let (store, registry, sessions, timestamps) = setup(dir.path());

        store
            .upsert_chat(&Chat { chat_id: ChatId(1), chat_type: CoreChatType::Group, title: "Family".into(), last_activity: "2026-01-01T00:00:00Z".into() })
            .unwrap();
        store
            .upsert_topic(&Topic {
                chat_id: ChatId(1),
                topic_id: CoreTopicId::GENERAL,
                name: "general".into(),
                folder: WorkspaceFolder("family-chat".into()),
                trigger_mode: outpost_core::types::TriggerMode::Always,
                last_activity: "2026-01-01T00:00:00Z".into(),
            })
            .unwrap();

        let pool = Arc::new(WorkerPool::new(outpost_core::config::PoolConfig::default()));
        let channel: Arc<dyn Channel + Send + Sync> =
            Arc::new(RecordingChannel { sent: StdMutex::new(Vec::new()), reactions: AtomicUsize::new(0) });
        let core = DispatchCore::new(store, registry, sessions, timestamps, pool, channel, test_config(dir.path()));

        core.dispatch_text("family-chat").await.unwrap();
    }

    #[test]
    fn execute_task_outcome_maps_pool_error_to_task_outcome_err() {
        let outcome = TaskOutcome::err("boom");
        assert!(matches!(outcome.status, RunStatus::Error));
        assert_eq!(outcome.summary(), "boom");
    }
}
