use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::types::{BufferedMessage, FlushedBatch, MULTI_SENDER_LABEL};

struct PendingBuffer {
    messages: Vec<BufferedMessage>,
    timer: JoinHandle<()>,
}

/// Coalesces bursts of messages per workspace into one flushed batch,
/// firing `delay` after the last message lands in that workspace's buffer.
pub struct Debouncer {
    delay: Duration,
    tx: mpsc::UnboundedSender<(String, FlushedBatch)>,
    buffers: DashMap<String, PendingBuffer>,
}

impl Debouncer {
    pub fn new(delay: Duration, tx: mpsc::UnboundedSender<(String, FlushedBatch)>) -> Arc<Self> {
        Arc::new(Self { delay, tx, buffers: DashMap::new() })
    }

    /// Append `message` to `key`'s buffer and (re)arm its quiescence timer.
    pub fn push(self: &Arc<Self>, key: &str, message: BufferedMessage) {
        let mut entry = self.buffers.entry(key.to_string()).or_insert_with(|| PendingBuffer {
            messages: Vec::new(),
            timer: tokio::spawn(async {}),
        });
        entry.messages.push(message);
        entry.timer.abort();

        let debouncer = Arc::clone(self);
        let key_owned = key.to_string();
        let delay = self.delay;
        entry.timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debouncer.fire(&key_owned);
        });
    }

    fn fire(&self, key: &str) {
        let Some((_, buffer)) = self.buffers.remove(key) else { return };
        if let Some(batch) = merge(buffer.messages) {
            debug!(workspace = key, "debounce buffer fired");
            let _ = self.tx.send((key.to_string(), batch));
        }
    }

    /// Cancel every pending timer and return each buffer's merged batch
    /// immediately, synchronously — used on process shutdown.
    pub fn flush_all(&self) -> Vec<(String, FlushedBatch)> {
        let keys: Vec<String> = self.buffers.iter().map(|e| e.key().clone()).collect();
        let mut flushed = Vec::new();
        for key in keys {
            if let Some((_, buffer)) = self.buffers.remove(&key) {
                buffer.timer.abort();
                if let Some(batch) = merge(buffer.messages) {
                    flushed.push((key, batch));
                }
            }
        }
        flushed
    }
}

fn merge(mut messages: Vec<BufferedMessage>) -> Option<FlushedBatch> {
    if messages.is_empty() {
        return None;
    }
    messages.sort_by_key(|m| m.timestamp);

    let distinct_senders = messages
        .iter()
        .map(|m| m.sender.as_str())
        .collect::<std::collections::HashSet<_>>()
        .len();
    let multi = distinct_senders > 1;

    let content = messages
        .iter()
        .map(|m| if multi { format!("[{}]: {}", m.sender, m.content) } else { m.content.clone() })
        .collect::<Vec<_>>()
        .join("\n");

    let sender_label = if multi { MULTI_SENDER_LABEL.to_string() } else { messages[0].sender.clone() };
    let reply_to = messages.iter().map(|m| m.message_id).max().expect("non-empty");

    Some(FlushedBatch { content, sender_label, reply_to })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn msg(sender: &str, content: &str, id: i64, offset_secs: i64) -> BufferedMessage {
        BufferedMessage {
            sender: sender.to_string(),
            content: content.to_string(),
            message_id: id,
            reply_to: None,
            timestamp: chrono::Utc::now() + ChronoDuration::seconds(offset_secs),
        }
    }

    #[test]
    fn single_sender_batch_keeps_plain_content_and_its_name() {
        let batch = merge(vec![msg("alice", "hi", 1, 0), msg("alice", "there", 2, 1)]).unwrap();
        assert_eq!(batch.content, "hi\nthere");
        assert_eq!(batch.sender_label, "alice");
        assert_eq!(batch.reply_to, 2);
    }

    #[test]
    fn multi_sender_batch_prefixes_each_line_and_uses_literal_label() {
        let batch = merge(vec![msg("alice", "hi", 1, 0), msg("bob", "yo", 2, 1)]).unwrap();
        assert_eq!(batch.content, "[alice]: hi\n[bob]: yo");
        assert_eq!(batch.sender_label, MULTI_SENDER_LABEL);
    }

    #[test]
    fn merge_orders_by_timestamp_not_arrival() {
        let batch = merge(vec![msg("alice", "second", 2, 5), msg("alice", "first", 1, 0)]).unwrap();
        assert_eq!(batch.content, "first\nsecond");
        assert_eq!(batch.reply_to, 1);
    }

    #[test]
    fn merge_of_empty_buffer_is_none() {
        assert!(merge(Vec::new()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn push_fires_after_quiescence_and_resets_on_new_message() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer::new(Duration::from_secs(2), tx);

        debouncer.push("w1", msg("alice", "hi", 1, 0));
        tokio::time::advance(Duration::from_millis(500)).await;
        debouncer.push("w1", msg("alice", "again", 2, 1));
        tokio::time::advance(Duration::from_secs(2)).await;

        let (key, batch) = rx.recv().await.unwrap();
        assert_eq!(key, "w1");
        assert_eq!(batch.content, "hi\nagain");
    }

    #[tokio::test]
    async fn flush_all_returns_pending_buffers_synchronously() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer::new(Duration::from_secs(2), tx);
        debouncer.push("w1", msg("alice", "hi", 1, 0));

        let flushed = debouncer.flush_all();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].0, "w1");
        assert_eq!(flushed[0].1.content, "hi");
    }
}
