use outpost_core::types::{ChatId, WorkspaceFolder};
use outpost_store::Store;

use crate::error::Result;

/// Checks the authorization rules from the mailbox action table: `main` may
/// act on anything, a non-main workspace only on chats/tasks it owns.
pub struct Authorizer<'a> {
    pub store: &'a Store,
}

impl Authorizer<'_> {
    pub fn source_owns_chat(&self, source: &WorkspaceFolder, chat_id: ChatId) -> Result<bool> {
        Ok(self.store.topics_for_chat(chat_id)?.iter().any(|t| &t.folder == source))
    }

    /// Message/reaction actions: allowed from `main`, or from a workspace that owns
    /// a topic bound to `chat_id`.
    pub fn authorize_message(&self, source: &WorkspaceFolder, chat_id: ChatId) -> Result<bool> {
        Ok(source.is_main() || self.source_owns_chat(source, chat_id)?)
    }

    /// Task mutation actions: allowed from `main`, or from the task's own folder.
    pub fn authorize_task_target(&self, source: &WorkspaceFolder, task_folder: &WorkspaceFolder) -> bool {
        source.is_main() || source == task_folder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_core::types::{TopicId, TriggerMode};
    use outpost_store::types::Topic;
    use rusqlite::Connection;

    fn memory_store() -> Store {
        let conn = Connection::open_in_memory().unwrap();
        outpost_store::db::init_db(&conn).unwrap();
        Store::new(conn)
    }

    #[test]
    fn main_is_always_authorized_for_messages() {
        let store = memory_store();
        let authorizer = Authorizer { store: &store };
        assert!(authorizer.authorize_message(&WorkspaceFolder::main(), ChatId(1)).unwrap());
    }

    #[test]
    fn non_main_is_authorized_only_for_its_own_chat() {
        let store = memory_store();
        store
            .upsert_topic(&Topic {
                chat_id: ChatId(7),
                topic_id: TopicId::GENERAL,
                name: "family".into(),
                folder: WorkspaceFolder::from("family-chat"),
                trigger_mode: TriggerMode::Always,
                last_activity: "2026-01-01T00:00:00Z".into(),
            })
            .unwrap();

        let authorizer = Authorizer { store: &store };
        let owner = WorkspaceFolder::from("family-chat");
        let stranger = WorkspaceFolder::from("other-chat");
        assert!(authorizer.authorize_message(&owner, ChatId(7)).unwrap());
        assert!(!authorizer.authorize_message(&stranger, ChatId(7)).unwrap());
    }

    #[test]
    fn task_target_authorization_matches_folder_or_main() {
        let store = memory_store();
        let authorizer = Authorizer { store: &store };
        let owner = WorkspaceFolder::from("family-chat");
        assert!(authorizer.authorize_task_target(&WorkspaceFolder::main(), &owner));
        assert!(authorizer.authorize_task_target(&owner, &owner));
        assert!(!authorizer.authorize_task_target(&WorkspaceFolder::from("other"), &owner));
    }
}
