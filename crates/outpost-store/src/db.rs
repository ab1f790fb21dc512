use rusqlite::{Connection, Result};

/// Initialise all store tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_chats_table(conn)?;
    create_topics_table(conn)?;
    create_messages_table(conn)?;
    create_scheduled_tasks_table(conn)?;
    create_task_run_logs_table(conn)?;
    Ok(())
}

fn create_chats_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chats (
            chat_id       INTEGER NOT NULL PRIMARY KEY,
            chat_type     TEXT    NOT NULL,
            title         TEXT    NOT NULL,
            last_activity TEXT    NOT NULL
        ) STRICT;",
    )
}

fn create_topics_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS topics (
            chat_id       INTEGER NOT NULL,
            topic_id      INTEGER NOT NULL,
            name          TEXT    NOT NULL,
            folder        TEXT    NOT NULL UNIQUE,
            trigger_mode  TEXT    NOT NULL DEFAULT 'mention',
            last_activity TEXT    NOT NULL,
            PRIMARY KEY (chat_id, topic_id)
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_topics_folder ON topics (folder);",
    )
}

fn create_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            chat_id            INTEGER NOT NULL,
            topic_id           INTEGER NOT NULL,
            id                 INTEGER NOT NULL,
            sender_id          TEXT    NOT NULL,
            sender_name        TEXT    NOT NULL,
            content            TEXT    NOT NULL,
            message_type       TEXT    NOT NULL DEFAULT 'text',
            timestamp          TEXT    NOT NULL,
            is_bot             INTEGER NOT NULL DEFAULT 0,
            reply_to           INTEGER,
            reaction_emoji     TEXT,
            reaction_action    TEXT,
            target_message_id  INTEGER,
            worker_session_id  TEXT,
            PRIMARY KEY (chat_id, topic_id, id)
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_messages_order
            ON messages (chat_id, topic_id, timestamp);",
    )
}

fn create_scheduled_tasks_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS scheduled_tasks (
            id             TEXT    NOT NULL PRIMARY KEY,
            chat_id        INTEGER NOT NULL,
            topic_id       INTEGER NOT NULL,
            folder         TEXT    NOT NULL,
            prompt         TEXT    NOT NULL,
            schedule_type  TEXT    NOT NULL,
            schedule_value TEXT    NOT NULL,
            context_mode   TEXT    NOT NULL DEFAULT 'group',
            next_run       TEXT,
            last_run       TEXT,
            last_result    TEXT,
            status         TEXT    NOT NULL DEFAULT 'active',
            created_at     TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_tasks_next_run
            ON scheduled_tasks (status, next_run);
        CREATE INDEX IF NOT EXISTS idx_tasks_folder
            ON scheduled_tasks (folder);",
    )
}

fn create_task_run_logs_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS task_run_logs (
            id          INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
            task_id     TEXT    NOT NULL,
            run_at      TEXT    NOT NULL,
            duration_ms INTEGER NOT NULL,
            status      TEXT    NOT NULL,
            result      TEXT,
            error       TEXT
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_run_logs_task
            ON task_run_logs (task_id, run_at DESC);",
    )
}
