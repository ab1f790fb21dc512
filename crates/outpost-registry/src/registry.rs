use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{debug, warn};

use outpost_core::types::ChatId;

use crate::error::Result;
use crate::types::RegisteredChat;

/// File-backed set of chats the supervisor will process.
///
/// The whole array is loaded on start and rewritten atomically (temp file
/// + rename) on every mutation — there are at most a few hundred entries,
/// so a full rewrite is simpler and cheap enough to not need a database.
pub struct Registry {
    path: PathBuf,
    chats: RwLock<Vec<RegisteredChat>>,
}

impl Registry {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let chats = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            Vec::new()
        };
        Ok(Self { path, chats: RwLock::new(chats) })
    }

    pub fn is_registered(&self, chat_id: ChatId) -> bool {
        self.chats.read().unwrap().iter().any(|c| c.chat_id == chat_id)
    }

    pub fn get(&self, chat_id: ChatId) -> Option<RegisteredChat> {
        self.chats.read().unwrap().iter().find(|c| c.chat_id == chat_id).cloned()
    }

    pub fn list(&self) -> Vec<RegisteredChat> {
        self.chats.read().unwrap().clone()
    }

    pub fn register(&self, chat: RegisteredChat) -> Result<()> {
        let mut chats = self.chats.write().unwrap();
        if let Some(existing) = chats.iter_mut().find(|c| c.chat_id == chat.chat_id) {
            *existing = chat;
        } else {
            chats.push(chat);
        }
        self.persist(&chats)
    }

    pub fn update(&self, chat_id: ChatId, f: impl FnOnce(&mut RegisteredChat)) -> Result<bool> {
        let mut chats = self.chats.write().unwrap();
        let Some(entry) = chats.iter_mut().find(|c| c.chat_id == chat_id) else {
            return Ok(false);
        };
        f(entry);
        self.persist(&chats)?;
        Ok(true)
    }

    pub fn unregister(&self, chat_id: ChatId) -> Result<bool> {
        let mut chats = self.chats.write().unwrap();
        let before = chats.len();
        chats.retain(|c| c.chat_id != chat_id);
        let removed = chats.len() != before;
        if removed {
            self.persist(&chats)?;
        } else {
            debug!(%chat_id, "unregister: chat was not registered");
        }
        Ok(removed)
    }

    fn persist(&self, chats: &[RegisteredChat]) -> Result<()> {
        let body = serde_json::to_string_pretty(chats)?;
        write_atomic(&self.path, &body)?;
        Ok(())
    }
}

fn write_atomic(path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, body)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Evaluate whether text `content` fires a dispatch in workspace `folder`.
/// `main` always fires; otherwise follows the registered chat's trigger.
/// On a mention match, the pattern is stripped (case-insensitively) from
/// the returned content. `assistant_name` backs the default mention
/// pattern (`@<assistant_name>`) when a chat has none configured.
pub fn evaluate_trigger(
    is_main: bool,
    chat: Option<&RegisteredChat>,
    assistant_name: &str,
    content: &str,
) -> Option<String> {
    if is_main {
        return Some(content.to_string());
    }
    let chat = chat?;
    match chat.trigger.mode {
        outpost_core::types::TriggerMode::Always => Some(content.to_string()),
        outpost_core::types::TriggerMode::Disabled => None,
        outpost_core::types::TriggerMode::Mention => {
            let pattern = chat
                .trigger
                .mention_pattern
                .clone()
                .unwrap_or_else(|| format!("@{assistant_name}"));
            strip_mentions(content, &pattern)
        }
    }
}

fn strip_mentions(content: &str, pattern: &str) -> Option<String> {
    let lower_content = content.to_lowercase();
    let lower_pattern = pattern.to_lowercase();
    if !lower_content.contains(&lower_pattern) {
        warn!(pattern, "mention pattern did not match; trigger skipped");
        return None;
    }
    let mut result = String::with_capacity(content.len());
    let mut rest = content;
    loop {
        let lower_rest = rest.to_lowercase();
        match lower_rest.find(&lower_pattern) {
            Some(idx) => {
                result.push_str(&rest[..idx]);
                rest = &rest[idx + pattern.len()..];
            }
            None => {
                result.push_str(rest);
                break;
            }
        }
    }
    // Collapse the whitespace left behind where the pattern was cut out,
    // so "hey @Nanomi what's up" strips to "hey what's up", not "hey  what's up".
    let collapsed: String = result.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(collapsed.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_core::types::{ChatType, TriggerMode};

    fn sample_chat(mode: TriggerMode) -> RegisteredChat {
        RegisteredChat {
            chat_id: ChatId(1),
            chat_type: ChatType::Group,
            title: "Family Chat".into(),
            trigger: crate::types::DefaultTrigger {
                mode,
                mention_pattern: Some("@Nanomi".into()),
            },
            added_at: "2026-01-01T00:00:00Z".into(),
            added_by: "main".into(),
            container_config: Default::default(),
        }
    }

    #[test]
    fn main_workspace_always_fires() {
        assert_eq!(evaluate_trigger(true, None, "assistant", "hey").unwrap(), "hey");
    }

    #[test]
    fn unregistered_chat_never_fires() {
        assert!(evaluate_trigger(false, None, "assistant", "hey").is_none());
    }

    #[test]
    fn disabled_mode_never_fires() {
        let chat = sample_chat(TriggerMode::Disabled);
        assert!(evaluate_trigger(false, Some(&chat), "assistant", "hey @Nanomi").is_none());
    }

    #[test]
    fn mention_mode_strips_pattern_case_insensitively() {
        let chat = sample_chat(TriggerMode::Mention);
        let out = evaluate_trigger(false, Some(&chat), "assistant", "hey @nanomi what's up").unwrap();
        assert_eq!(out, "hey what's up");
    }

    #[test]
    fn mention_mode_skips_without_match() {
        let chat = sample_chat(TriggerMode::Mention);
        assert!(evaluate_trigger(false, Some(&chat), "assistant", "no mention here").is_none());
    }

    #[test]
    fn mention_mode_falls_back_to_assistant_name_when_unconfigured() {
        let mut chat = sample_chat(TriggerMode::Mention);
        chat.trigger.mention_pattern = None;
        let out = evaluate_trigger(false, Some(&chat), "Nanomi", "hey @Nanomi what's up").unwrap();
        assert_eq!(out, "hey what's up");
    }

    #[test]
    fn registry_roundtrips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let registry = Registry::load(&path).unwrap();
        assert!(!registry.is_registered(ChatId(1)));

        registry.register(sample_chat(TriggerMode::Always)).unwrap();
        assert!(registry.is_registered(ChatId(1)));

        let reloaded = Registry::load(&path).unwrap();
        assert!(reloaded.is_registered(ChatId(1)));
        assert_eq!(reloaded.list().len(), 1);
    }

    #[test]
    fn unregister_returns_false_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::load(dir.path().join("registry.json")).unwrap();
        assert!(!registry.unregister(ChatId(99)).unwrap());
    }
}
