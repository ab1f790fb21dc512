use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::{channel::Channel, error::ChannelError, types::ChannelStatus, types::InboundEvent};

/// Minimum delay between reconnect attempts (seconds).
const BACKOFF_BASE_SECS: u64 = 5;
/// Maximum delay between reconnect attempts (seconds).
const BACKOFF_MAX_SECS: u64 = 300; // 5 minutes
/// Maximum number of reconnect attempts before giving up.
const MAX_ATTEMPTS: u32 = 10;
/// Jitter fraction applied to each delay (±10 %).
const JITTER_FRACTION: f64 = 0.10;

/// Manages a collection of channel adapters.
///
/// Channels are stored by their [`Channel::name`] and can be connected,
/// disconnected, or queried as a group. The manager applies exponential
/// backoff with jitter when a channel connection fails, and fans every
/// adapter's inbound events into one shared stream.
pub struct ChannelManager {
    channels: HashMap<String, Box<dyn Channel + Send + Sync>>,
}

impl ChannelManager {
    /// Create an empty manager with no registered channels.
    pub fn new() -> Self {
        Self { channels: HashMap::new() }
    }

    /// Register a channel adapter.
    ///
    /// If a channel with the same name is already registered it is replaced.
    pub fn register(&mut self, channel: Box<dyn Channel + Send + Sync>) {
        let name = channel.name().to_string();
        info!(channel = %name, "registering channel adapter");
        self.channels.insert(name, channel);
    }

    /// Connect all registered channels, wiring each into the shared inbound
    /// event stream returned as the receiver half.
    pub async fn connect_all(&mut self) -> mpsc::Receiver<InboundEvent> {
        let (tx, rx) = mpsc::channel(256);
        for (name, channel) in self.channels.iter_mut() {
            info!(channel = %name, "connecting channel");
            if let Err(e) = connect_with_backoff(name, channel.as_mut(), tx.clone()).await {
                error!(channel = %name, error = %e, "failed to connect channel after retries");
            }
        }
        rx
    }

    /// Disconnect all registered channels.
    ///
    /// Errors are logged but do not abort disconnection of remaining channels.
    pub async fn disconnect_all(&mut self) {
        for (name, channel) in self.channels.iter_mut() {
            info!(channel = %name, "disconnecting channel");
            if let Err(e) = channel.disconnect().await {
                warn!(channel = %name, error = %e, "error while disconnecting channel");
            }
        }
    }

    /// Return an immutable reference to the named channel, if it exists.
    pub fn get(&self, name: &str) -> Option<&(dyn Channel + Send + Sync)> {
        self.channels.get(name).map(|b| b.as_ref())
    }

    /// Return the current [`ChannelStatus`] for every registered channel.
    ///
    /// The returned `Vec` is sorted by channel name for deterministic output.
    pub fn statuses(&self) -> Vec<(String, ChannelStatus)> {
        let mut result: Vec<(String, ChannelStatus)> =
            self.channels.iter().map(|(name, ch)| (name.clone(), ch.status())).collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Attempt to connect a single channel with exponential backoff and ±10 % jitter.
///
/// Schedule: 5 s → 10 s → 20 s → … → 300 s (cap), up to [`MAX_ATTEMPTS`] tries.
async fn connect_with_backoff(
    name: &str,
    channel: &mut dyn Channel,
    events: mpsc::Sender<InboundEvent>,
) -> Result<(), ChannelError> {
    let mut delay_secs = BACKOFF_BASE_SECS;

    for attempt in 1..=MAX_ATTEMPTS {
        match channel.connect(events.clone()).await {
            Ok(()) => {
                info!(channel = %name, attempt, "channel connected successfully");
                return Ok(());
            }
            Err(e) if attempt == MAX_ATTEMPTS => {
                return Err(e);
            }
            Err(e) => {
                let jitter = jitter_secs(delay_secs);
                let total = delay_secs + jitter;
                warn!(
                    channel = %name,
                    attempt,
                    max = MAX_ATTEMPTS,
                    error = %e,
                    retry_after_secs = total,
                    "channel connect failed, retrying with backoff"
                );
                sleep(Duration::from_secs(total)).await;
                delay_secs = (delay_secs * 2).min(BACKOFF_MAX_SECS);
            }
        }
    }

    unreachable!("backoff loop exited without returning")
}

/// Return a jitter offset (0 … `JITTER_FRACTION * base_secs`) as integer seconds.
///
/// Uses a simple deterministic pseudo-random value derived from the current
/// monotonic timestamp, avoiding a rand dependency.
fn jitter_secs(base_secs: u64) -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);

    let max_jitter = ((base_secs as f64) * JITTER_FRACTION) as u64;
    if max_jitter == 0 {
        return 0;
    }
    (nanos as u64) % max_jitter
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use outpost_core::types::ChatId;

    struct FlakyChannel {
        name: String,
        fail_times: std::sync::atomic::AtomicU32,
        status: std::sync::Mutex<ChannelStatus>,
    }

    #[async_trait]
    impl Channel for FlakyChannel {
        fn name(&self) -> &str {
            &self.name
        }

        async fn connect(&mut self, _events: mpsc::Sender<InboundEvent>) -> Result<(), ChannelError> {
            if self.fail_times.load(std::sync::atomic::Ordering::SeqCst) > 0 {
                self.fail_times.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                return Err(ChannelError::ConnectionFailed("not yet".into()));
            }
            *self.status.lock().unwrap() = ChannelStatus::Connected;
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), ChannelError> {
            *self.status.lock().unwrap() = ChannelStatus::Disconnected;
            Ok(())
        }

        async fn send(&self, _msg: &crate::types::OutboundMessage) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn send_reaction(&self, _chat_id: ChatId, _message_id: i64, _emoji: &str) -> Result<(), ChannelError> {
            Ok(())
        }

        fn status(&self) -> ChannelStatus {
            self.status.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn statuses_report_connected_after_connect_all() {
        let mut manager = ChannelManager::new();
        manager.register(Box::new(FlakyChannel {
            name: "test".into(),
            fail_times: std::sync::atomic::AtomicU32::new(0),
            status: std::sync::Mutex::new(ChannelStatus::Disconnected),
        }));

        let _rx = manager.connect_all().await;
        let statuses = manager.statuses();
        assert_eq!(statuses.len(), 1);
        assert!(matches!(statuses[0].1, ChannelStatus::Connected));
    }

    #[test]
    fn jitter_never_exceeds_ten_percent_of_base() {
        for base in [5, 10, 20, 40, 300] {
            let j = jitter_secs(base);
            assert!(j <= base / 10 + 1);
        }
    }
}
