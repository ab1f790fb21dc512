//! Turns inbound chat-platform events into stored history, debounce
//! buffer pushes, and (for reactions) immediate dispatch.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use outpost_channels::InboundEvent;
use outpost_core::types::{ChatId, TopicId, TriggerMode, WorkspaceFolder};
use outpost_debounce::{BufferedMessage, Debouncer};
use outpost_dispatch::DispatchCore;
use outpost_registry::{evaluate_trigger, Registry};
use outpost_store::types::{Chat, Message, MessageType, Topic};
use outpost_store::Store;

/// The debounce key format from spec 4.F: `chat_id_topic_id`.
pub fn debounce_key(chat_id: ChatId, topic_id: TopicId) -> String {
    format!("{}_{}", chat_id.0, topic_id.0)
}

pub fn parse_debounce_key(key: &str) -> Option<(ChatId, TopicId)> {
    let (chat_part, topic_part) = key.split_once('_')?;
    Some((ChatId(chat_part.parse().ok()?), TopicId(topic_part.parse().ok()?)))
}

/// Resolve a fired debounce key back to its workspace folder and run the
/// text dispatch. Shared between the live flush consumer and the
/// shutdown-time synchronous flush.
pub async fn flush_key_to_dispatch(store: &Arc<Store>, dispatch: &Arc<DispatchCore>, key: &str) -> Result<(), String> {
    let (chat_id, topic_id) = parse_debounce_key(key).ok_or_else(|| format!("malformed debounce key {key:?}"))?;
    let topic = store
        .topic_by_key(chat_id, topic_id)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("no topic bound to debounce key {key:?}"))?;
    dispatch.dispatch_text(topic.folder.as_str()).await.map_err(|e| e.to_string())
}

/// Drains the Debouncer's flush channel for as long as the process runs,
/// re-dispatching text for whichever workspace just quiesced.
pub async fn run_debounce_consumer(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<(String, outpost_debounce::FlushedBatch)>,
    store: Arc<Store>,
    dispatch: Arc<DispatchCore>,
) {
    while let Some((key, _batch)) = rx.recv().await {
        if let Err(reason) = flush_key_to_dispatch(&store, &dispatch, &key).await {
            warn!(key, reason, "debounce flush could not be dispatched");
        }
    }
}

/// Everything needed to turn one inbound event into store writes, a
/// debounce push, or an immediate reaction dispatch.
pub struct EventContext {
    pub store: Arc<Store>,
    pub registry: Arc<Registry>,
    pub debouncer: Arc<Debouncer>,
    pub dispatch: Arc<DispatchCore>,
    pub main_chat_id: Option<i64>,
    pub assistant_name: String,
}

impl EventContext {
    pub async fn handle(&self, event: InboundEvent) {
        let is_main = self.main_chat_id == Some(event.chat_id.0);
        if !is_main && !self.registry.is_registered(event.chat_id) {
            debug!(chat_id = event.chat_id.0, "message from unregistered chat, dropping");
            return;
        }

        if let Err(e) = self.store.upsert_chat(&Chat {
            chat_id: event.chat_id,
            chat_type: event.chat_type,
            title: event.chat_title.clone(),
            last_activity: event.timestamp.clone(),
        }) {
            warn!(error = %e, "failed to upsert chat");
            return;
        }

        let folder = match self.resolve_folder(&event, is_main) {
            Ok(folder) => folder,
            Err(e) => {
                warn!(error = %e, "failed to resolve workspace folder for inbound event");
                return;
            }
        };

        if event.reaction_action.is_some() {
            self.handle_reaction(&event, &folder, is_main).await;
        } else {
            self.handle_text(&event, &folder, is_main);
        }
    }

    /// Looks up the topic already bound to (chat, topic), bumping its
    /// last_activity; otherwise assigns a fresh folder via the Session
    /// Router and persists it. `InboundEvent` carries no topic name, so
    /// every topic is routed on chat title alone — collisions (e.g. two
    /// named sub-topics of one chat) are still resolved by the router's
    /// numeric-suffix rule.
    fn resolve_folder(&self, event: &InboundEvent, is_main: bool) -> outpost_store::Result<WorkspaceFolder> {
        if let Some(mut topic) = self.store.topic_by_key(event.chat_id, event.topic_id)? {
            topic.last_activity = event.timestamp.clone();
            self.store.upsert_topic(&topic)?;
            return Ok(topic.folder);
        }

        let existing: HashSet<String> = self.store.all_folders()?.into_iter().collect();
        let folder = outpost_router::assign_folder(event.chat_id, &event.chat_title, None, &existing);

        let trigger_mode = if is_main {
            TriggerMode::Always
        } else {
            self.registry.get(event.chat_id).map(|c| c.trigger.mode).unwrap_or(TriggerMode::Mention)
        };
        let name = if event.topic_id.is_general() {
            event.chat_title.clone()
        } else {
            format!("topic-{}", event.topic_id.0)
        };

        let topic = Topic {
            chat_id: event.chat_id,
            topic_id: event.topic_id,
            name,
            folder: folder.clone(),
            trigger_mode,
            last_activity: event.timestamp.clone(),
        };
        self.store.upsert_topic(&topic)?;
        Ok(folder)
    }

    fn handle_text(&self, event: &InboundEvent, folder: &WorkspaceFolder, is_main: bool) {
        let chat = self.registry.get(event.chat_id);
        let Some(stripped) = evaluate_trigger(is_main, chat.as_ref(), &self.assistant_name, &event.content) else {
            // Doesn't fire a dispatch, but the message still happened —
            // keep it in history with its original content.
            self.store_message(event, &event.content, MessageType::Text);
            return;
        };

        self.store_message(event, &stripped, MessageType::Text);

        let timestamp = chrono::DateTime::parse_from_rfc3339(&event.timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        self.debouncer.push(
            &debounce_key(event.chat_id, event.topic_id),
            BufferedMessage {
                sender: event.sender_name.clone(),
                content: stripped,
                message_id: event.message_id,
                reply_to: event.reply_to,
                timestamp,
            },
        );
        let _ = folder;
    }

    async fn handle_reaction(&self, event: &InboundEvent, folder: &WorkspaceFolder, is_main: bool) {
        self.store_message(event, &event.content, MessageType::Reaction);

        if event.reaction_action.as_deref() != Some("added") {
            return;
        }

        let always_mode = is_main
            || self.registry.get(event.chat_id).map(|c| c.trigger.mode) == Some(TriggerMode::Always);
        let targets_bot_message = event
            .target_message_id
            .and_then(|id| self.store.message_by_id(event.chat_id, event.topic_id, id).ok().flatten())
            .map(|m| m.is_bot)
            .unwrap_or(false);

        if !always_mode && !targets_bot_message {
            return;
        }

        let (Some(emoji), Some(target_message_id)) = (event.reaction_emoji.clone(), event.target_message_id) else {
            return;
        };

        if let Err(e) = self
            .dispatch
            .dispatch_reaction(folder.as_str(), event.chat_id, &event.sender_name, &emoji, target_message_id)
            .await
        {
            warn!(folder = folder.as_str(), error = %e, "reaction dispatch failed");
        }
    }

    fn store_message(&self, event: &InboundEvent, content: &str, message_type: MessageType) {
        let msg = Message {
            chat_id: event.chat_id,
            topic_id: event.topic_id,
            id: event.message_id,
            sender_id: event.sender_id.clone(),
            sender_name: event.sender_name.clone(),
            content: content.to_string(),
            message_type,
            timestamp: event.timestamp.clone(),
            is_bot: event.is_bot,
            reply_to: event.reply_to,
            reaction_emoji: event.reaction_emoji.clone(),
            reaction_action: event.reaction_action.clone(),
            target_message_id: event.target_message_id,
            worker_session_id: None,
        };
        if let Err(e) = self.store.store_message(&msg) {
            warn!(error = %e, "failed to store inbound message");
        }
    }
}
