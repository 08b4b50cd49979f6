use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::ChatMessage;

pub fn session_channel(session_id: &str) -> String {
    format!("chat:{session_id}")
}

pub fn balance_channel(session_id: &str) -> String {
    format!("chatbalance:{session_id}")
}

/// Event pushed to clients watching a chat session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatEvent {
    Message {
        message: ChatMessage,
    },
    Balance {
        balance: i64,
    },
    Claim {
        claimed_by_id: Option<String>,
        claimed_by_name: Option<String>,
    },
    Resolved {
        resolved: bool,
    },
    Seen,
}

/// Fire-and-forget push channel towards connected clients.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn publish(&self, channel: &str, payload: String) -> anyhow::Result<()>;
}

/// In-process broadcaster backed by per-channel `tokio::sync::broadcast`
/// senders. Publishing to a channel nobody subscribed to is a no-op.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: DashMap<String, broadcast::Sender<String>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        use dashmap::mapref::entry::Entry;
        match self.channels.entry(channel.to_string()) {
            Entry::Occupied(e) => e.get().subscribe(),
            Entry::Vacant(v) => {
                let (tx, rx) = broadcast::channel(16);
                v.insert(tx);
                rx
            }
        }
    }
}

#[async_trait]
impl Broadcaster for ChannelRegistry {
    async fn publish(&self, channel: &str, payload: String) -> anyhow::Result<()> {
        if let Some(tx) = self.channels.get(channel) {
            // send only fails when every receiver is gone, which is fine
            let _ = tx.send(payload);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscribers() {
        let registry = ChannelRegistry::new();
        let mut rx = registry.subscribe("chat:abc");
        registry
            .publish("chat:abc", "{\"type\":\"seen\"}".into())
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), "{\"type\":\"seen\"}");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let registry = ChannelRegistry::new();
        registry.publish("chat:nobody", "x".into()).await.unwrap();
    }
}
