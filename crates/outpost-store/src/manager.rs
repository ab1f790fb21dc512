use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use outpost_core::types::{ChatId, ChatType, TaskId, TopicId, TriggerMode, WorkspaceFolder};

use crate::error::{Result, StoreError};
use crate::types::*;

/// Durable collections backing the supervisor: chats, topics, messages,
/// scheduled tasks and their run history.
///
/// Thread-safe: a single SQLite connection guarded by a mutex. The
/// supervisor is the sole writer; there is no need for a connection pool.
pub struct Store {
    db: Mutex<Connection>,
}

impl Store {
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    pub fn upsert_chat(&self, chat: &Chat) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO chats (chat_id, chat_type, title, last_activity)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(chat_id) DO UPDATE SET
                chat_type = excluded.chat_type,
                title = excluded.title,
                last_activity = excluded.last_activity",
            params![chat.chat_id.0, chat.chat_type.to_string(), chat.title, chat.last_activity],
        )?;
        Ok(())
    }

    pub fn chat(&self, chat_id: ChatId) -> Result<Option<Chat>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT chat_id, chat_type, title, last_activity FROM chats WHERE chat_id = ?1",
            params![chat_id.0],
            row_to_chat,
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn upsert_topic(&self, topic: &Topic) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO topics (chat_id, topic_id, name, folder, trigger_mode, last_activity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(chat_id, topic_id) DO UPDATE SET
                name = excluded.name,
                trigger_mode = excluded.trigger_mode,
                last_activity = excluded.last_activity",
            params![
                topic.chat_id.0,
                topic.topic_id.0,
                topic.name,
                topic.folder.as_str(),
                topic.trigger_mode.to_string(),
                topic.last_activity,
            ],
        )?;
        Ok(())
    }

    pub fn topic_by_key(&self, chat_id: ChatId, topic_id: TopicId) -> Result<Option<Topic>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT chat_id, topic_id, name, folder, trigger_mode, last_activity
             FROM topics WHERE chat_id = ?1 AND topic_id = ?2",
            params![chat_id.0, topic_id.0],
            row_to_topic,
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn topic_by_folder(&self, folder: &str) -> Result<Option<Topic>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT chat_id, topic_id, name, folder, trigger_mode, last_activity
             FROM topics WHERE folder = ?1",
            params![folder],
            row_to_topic,
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// All folders currently assigned, used by the Session Router to pick a
    /// collision-free slug.
    pub fn all_folders(&self) -> Result<Vec<String>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare("SELECT folder FROM topics")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn topics_for_chat(&self, chat_id: ChatId) -> Result<Vec<Topic>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT chat_id, topic_id, name, folder, trigger_mode, last_activity
             FROM topics WHERE chat_id = ?1",
        )?;
        let rows = stmt.query_map(params![chat_id.0], row_to_topic)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Idempotent on (chat_id, topic_id, id): a replayed message is a no-op.
    pub fn store_message(&self, msg: &Message) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO messages
             (chat_id, topic_id, id, sender_id, sender_name, content, message_type,
              timestamp, is_bot, reply_to, reaction_emoji, reaction_action,
              target_message_id, worker_session_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                msg.chat_id.0,
                msg.topic_id.0,
                msg.id,
                msg.sender_id,
                msg.sender_name,
                msg.content,
                msg.message_type.to_string(),
                msg.timestamp,
                msg.is_bot,
                msg.reply_to,
                msg.reaction_emoji,
                msg.reaction_action,
                msg.target_message_id,
                msg.worker_session_id,
            ],
        )?;
        Ok(())
    }

    /// Messages strictly newer than `since_ts`, oldest first. When
    /// `exclude_prefix` is set, messages whose content starts with it
    /// (case-insensitive) are dropped — used to keep the assistant's own
    /// echoed replies out of the next prompt.
    pub fn messages_since(
        &self,
        chat_id: ChatId,
        topic_id: TopicId,
        since_ts: &str,
        exclude_prefix: Option<&str>,
    ) -> Result<Vec<Message>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT chat_id, topic_id, id, sender_id, sender_name, content, message_type,
                    timestamp, is_bot, reply_to, reaction_emoji, reaction_action,
                    target_message_id, worker_session_id
             FROM messages
             WHERE chat_id = ?1 AND topic_id = ?2 AND timestamp > ?3 AND message_type = 'text'
             ORDER BY timestamp ASC",
        )?;
        let rows = stmt.query_map(params![chat_id.0, topic_id.0, since_ts], row_to_message)?;
        let mut out: Vec<Message> = rows.filter_map(|r| r.ok()).collect();
        if let Some(prefix) = exclude_prefix {
            let prefix_lower = prefix.to_lowercase();
            out.retain(|m| !m.content.to_lowercase().starts_with(&prefix_lower));
        }
        Ok(out)
    }

    /// Look up a single stored message by its full primary key. Used to
    /// check whether a reaction targets a bot-authored message.
    pub fn message_by_id(&self, chat_id: ChatId, topic_id: TopicId, id: i64) -> Result<Option<Message>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT chat_id, topic_id, id, sender_id, sender_name, content, message_type,
                    timestamp, is_bot, reply_to, reaction_emoji, reaction_action,
                    target_message_id, worker_session_id
             FROM messages WHERE chat_id = ?1 AND topic_id = ?2 AND id = ?3",
            params![chat_id.0, topic_id.0, id],
            row_to_message,
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn create_task(&self, task: &ScheduledTask) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO scheduled_tasks
             (id, chat_id, topic_id, folder, prompt, schedule_type, schedule_value,
              context_mode, next_run, last_run, last_result, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                task.id.as_str(),
                task.chat_id.0,
                task.topic_id.0,
                task.folder.as_str(),
                task.prompt,
                task.schedule_type.to_string(),
                task.schedule_value,
                task.context_mode.to_string(),
                task.next_run,
                task.last_run,
                task.last_result,
                task.status.to_string(),
                task.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn task(&self, id: &TaskId) -> Result<Option<ScheduledTask>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, chat_id, topic_id, folder, prompt, schedule_type, schedule_value,
                    context_mode, next_run, last_run, last_result, status, created_at
             FROM scheduled_tasks WHERE id = ?1",
            params![id.as_str()],
            row_to_task,
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn tasks_for_folder(&self, folder: &str) -> Result<Vec<ScheduledTask>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, chat_id, topic_id, folder, prompt, schedule_type, schedule_value,
                    context_mode, next_run, last_run, last_result, status, created_at
             FROM scheduled_tasks WHERE folder = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![folder], row_to_task)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn all_tasks(&self) -> Result<Vec<ScheduledTask>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, chat_id, topic_id, folder, prompt, schedule_type, schedule_value,
                    context_mode, next_run, last_run, last_result, status, created_at
             FROM scheduled_tasks ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], row_to_task)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Tasks due to run at or before `now` (ISO-8601), ordered by next_run.
    pub fn due_tasks(&self, now: &str) -> Result<Vec<ScheduledTask>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, chat_id, topic_id, folder, prompt, schedule_type, schedule_value,
                    context_mode, next_run, last_run, last_result, status, created_at
             FROM scheduled_tasks
             WHERE status = 'active' AND next_run IS NOT NULL AND next_run <= ?1
             ORDER BY next_run",
        )?;
        let rows = stmt.query_map(params![now], row_to_task)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn set_task_status(&self, id: &TaskId, status: TaskStatus) -> Result<()> {
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE scheduled_tasks SET status = ?1 WHERE id = ?2",
            params![status.to_string(), id.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::TaskNotFound { id: id.as_str().to_string() });
        }
        Ok(())
    }

    pub fn cancel_task(&self, id: &TaskId) -> Result<()> {
        let db = self.db.lock().unwrap();
        let changed = db.execute("DELETE FROM scheduled_tasks WHERE id = ?1", params![id.as_str()])?;
        if changed == 0 {
            return Err(StoreError::TaskNotFound { id: id.as_str().to_string() });
        }
        Ok(())
    }

    /// After a run: record last_run/last_result, advance next_run, and mark
    /// the task completed once no next_run remains.
    pub fn update_after_run(
        &self,
        id: &TaskId,
        ran_at: &str,
        next_run: Option<&str>,
        last_result: &str,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        let truncated: String = last_result.chars().take(200).collect();
        let status = if next_run.is_none() { "completed" } else { "active" };
        let changed = db.execute(
            "UPDATE scheduled_tasks
             SET last_run = ?1, next_run = ?2, last_result = ?3, status = ?4
             WHERE id = ?5",
            params![ran_at, next_run, truncated, status, id.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::TaskNotFound { id: id.as_str().to_string() });
        }
        Ok(())
    }

    pub fn log_run(&self, log: &TaskRunLog) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO task_run_logs (task_id, run_at, duration_ms, status, result, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                log.task_id.as_str(),
                log.run_at,
                log.duration_ms,
                log.status.to_string(),
                log.result,
                log.error,
            ],
        )?;
        Ok(())
    }
}

fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    let chat_type_str: String = row.get(1)?;
    Ok(Chat {
        chat_id: ChatId(row.get(0)?),
        chat_type: chat_type_str.parse().unwrap_or(ChatType::Private),
        title: row.get(2)?,
        last_activity: row.get(3)?,
    })
}

fn row_to_topic(row: &rusqlite::Row<'_>) -> rusqlite::Result<Topic> {
    let trigger_str: String = row.get(4)?;
    Ok(Topic {
        chat_id: ChatId(row.get(0)?),
        topic_id: TopicId(row.get(1)?),
        name: row.get(2)?,
        folder: WorkspaceFolder(row.get(3)?),
        trigger_mode: trigger_str.parse().unwrap_or(TriggerMode::Mention),
        last_activity: row.get(5)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let type_str: String = row.get(6)?;
    Ok(Message {
        chat_id: ChatId(row.get(0)?),
        topic_id: TopicId(row.get(1)?),
        id: row.get(2)?,
        sender_id: row.get(3)?,
        sender_name: row.get(4)?,
        content: row.get(5)?,
        message_type: type_str.parse().unwrap_or(MessageType::Text),
        timestamp: row.get(7)?,
        is_bot: row.get(8)?,
        reply_to: row.get(9)?,
        reaction_emoji: row.get(10)?,
        reaction_action: row.get(11)?,
        target_message_id: row.get(12)?,
        worker_session_id: row.get(13)?,
    })
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduledTask> {
    let schedule_type_str: String = row.get(5)?;
    let context_mode_str: String = row.get(7)?;
    let status_str: String = row.get(11)?;
    Ok(ScheduledTask {
        id: TaskId(row.get(0)?),
        chat_id: ChatId(row.get(1)?),
        topic_id: TopicId(row.get(2)?),
        folder: WorkspaceFolder(row.get(3)?),
        prompt: row.get(4)?,
        schedule_type: schedule_type_str.parse().unwrap_or(ScheduleType::Once),
        schedule_value: row.get(6)?,
        context_mode: context_mode_str.parse().unwrap_or(ContextMode::Group),
        next_run: row.get(8)?,
        last_run: row.get(9)?,
        last_result: row.get(10)?,
        status: status_str.parse().unwrap_or(TaskStatus::Active),
        created_at: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store() -> Store {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        Store::new(conn)
    }

    #[test]
    fn store_message_is_idempotent() {
        let store = memory_store();
        let msg = Message {
            chat_id: ChatId(1),
            topic_id: TopicId(0),
            id: 42,
            sender_id: "u1".into(),
            sender_name: "Alice".into(),
            content: "hi".into(),
            message_type: MessageType::Text,
            timestamp: "2026-01-01T00:00:00Z".into(),
            is_bot: false,
            reply_to: None,
            reaction_emoji: None,
            reaction_action: None,
            target_message_id: None,
            worker_session_id: None,
        };
        store.store_message(&msg).unwrap();
        store.store_message(&msg).unwrap();
        let since = store
            .messages_since(ChatId(1), TopicId(0), "2025-01-01T00:00:00Z", None)
            .unwrap();
        assert_eq!(since.len(), 1);
    }

    #[test]
    fn messages_since_excludes_assistant_prefix() {
        let store = memory_store();
        for (id, sender, content) in [
            (1i64, "u1", "hello there"),
            (2, "bot", "assistant: all good"),
        ] {
            store
                .store_message(&Message {
                    chat_id: ChatId(1),
                    topic_id: TopicId(0),
                    id,
                    sender_id: sender.into(),
                    sender_name: sender.into(),
                    content: content.into(),
                    message_type: MessageType::Text,
                    timestamp: format!("2026-01-01T00:0{id}:00Z"),
                    is_bot: sender == "bot",
                    reply_to: None,
                    reaction_emoji: None,
                    reaction_action: None,
                    target_message_id: None,
                    worker_session_id: None,
                })
                .unwrap();
        }
        let since = store
            .messages_since(ChatId(1), TopicId(0), "2025-01-01T00:00:00Z", Some("assistant:"))
            .unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].content, "hello there");
    }

    #[test]
    fn due_tasks_respects_status_and_next_run() {
        let store = memory_store();
        store
            .create_task(&ScheduledTask {
                id: TaskId("t1".into()),
                chat_id: ChatId(1),
                topic_id: TopicId(0),
                folder: WorkspaceFolder::main(),
                prompt: "ping".into(),
                schedule_type: ScheduleType::Interval,
                schedule_value: "3600".into(),
                context_mode: ContextMode::Group,
                next_run: Some("2026-01-01T00:00:00Z".into()),
                last_run: None,
                last_result: None,
                status: TaskStatus::Active,
                created_at: "2025-01-01T00:00:00Z".into(),
            })
            .unwrap();
        let due = store.due_tasks("2026-01-01T00:00:01Z").unwrap();
        assert_eq!(due.len(), 1);
        store.set_task_status(&TaskId("t1".into()), TaskStatus::Paused).unwrap();
        let due = store.due_tasks("2026-01-01T00:00:01Z").unwrap();
        assert!(due.is_empty());
    }

    #[test]
    fn update_after_run_completes_task_without_next_run() {
        let store = memory_store();
        store
            .create_task(&ScheduledTask {
                id: TaskId("t2".into()),
                chat_id: ChatId(1),
                topic_id: TopicId(0),
                folder: WorkspaceFolder::main(),
                prompt: "once".into(),
                schedule_type: ScheduleType::Once,
                schedule_value: "2026-01-01T00:00:00Z".into(),
                context_mode: ContextMode::Isolated,
                next_run: Some("2026-01-01T00:00:00Z".into()),
                last_run: None,
                last_result: None,
                status: TaskStatus::Active,
                created_at: "2025-01-01T00:00:00Z".into(),
            })
            .unwrap();
        store
            .update_after_run(&TaskId("t2".into()), "2026-01-01T00:00:00Z", None, "done")
            .unwrap();
        let task = store.task(&TaskId("t2".into())).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.next_run.is_none());
    }

    #[test]
    fn message_by_id_finds_stored_message_and_nothing_else() {
        let store = memory_store();
        store
            .store_message(&Message {
                chat_id: ChatId(1),
                topic_id: TopicId(0),
                id: 7,
                sender_id: "bot".into(),
                sender_name: "assistant".into(),
                content: "all good".into(),
                message_type: MessageType::AgentResponse,
                timestamp: "2026-01-01T00:00:00Z".into(),
                is_bot: true,
                reply_to: None,
                reaction_emoji: None,
                reaction_action: None,
                target_message_id: None,
                worker_session_id: None,
            })
            .unwrap();

        let found = store.message_by_id(ChatId(1), TopicId(0), 7).unwrap().unwrap();
        assert!(found.is_bot);
        assert!(store.message_by_id(ChatId(1), TopicId(0), 8).unwrap().is_none());
    }
}
