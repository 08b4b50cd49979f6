use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::models::{ChatSession, Policy};
use crate::pubsub::{balance_channel, session_channel, Broadcaster, ChatEvent};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9\._%+-]+@[A-Za-z0-9\.-]+\.[A-Za-z]{2,63}$").expect("valid regex")
});

pub fn is_valid_email_address(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Off-band contact targets configured on a policy.
#[derive(Debug, Clone, Default)]
pub struct ContactChannels {
    pub telegram: Option<String>,
    pub nostr: Vec<String>,
    pub emails: Vec<String>,
}

impl ContactChannels {
    pub fn from_policy(policy: &Policy) -> Self {
        ContactChannels {
            telegram: policy
                .notify_telegram
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            nostr: policy
                .notify_nostr
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(|value| vec![value.to_string()])
                .unwrap_or_default(),
            emails: parse_notify_emails(policy.notify_email.as_deref()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.telegram.is_none() && self.nostr.is_empty() && self.emails.is_empty()
    }
}

fn parse_notify_emails(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return vec![];
    };
    raw.split(',')
        .map(str::trim)
        .filter(|email| !email.is_empty() && is_valid_email_address(email))
        .map(str::to_string)
        .collect()
}

/// Off-band delivery (telegram / nostr / email). Channels that are not
/// configured are simply skipped by implementations.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        channels: &ContactChannels,
        message: &str,
        category: &str,
    ) -> anyhow::Result<()>;
}

/// Stub notifier that only logs. Hosts wire a real transport in its place.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        channels: &ContactChannels,
        message: &str,
        category: &str,
    ) -> anyhow::Result<()> {
        info!(
            category,
            telegram = channels.telegram.is_some(),
            nostr = channels.nostr.len(),
            emails = channels.emails.len(),
            message,
            "chat notification"
        );
        Ok(())
    }
}

/// Direct link to a chat session, for notifications and the public page.
pub fn build_chat_link(base_url: Option<&str>, session: &ChatSession) -> String {
    if let Some(base) = base_url {
        return format!(
            "{}/chat/{}/{}",
            base.trim_end_matches('/'),
            session.policy_id,
            session.id
        );
    }
    if let Some(public_url) = &session.public_url {
        return public_url.clone();
    }
    format!("/chat/{}/{}", session.policy_id, session.id)
}

/// key: chat-notify -> realtime fan-out and off-band alerts, all best-effort
pub struct Notifications {
    broadcaster: Arc<dyn Broadcaster>,
    notifier: Arc<dyn Notifier>,
}

impl Notifications {
    pub fn new(broadcaster: Arc<dyn Broadcaster>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            broadcaster,
            notifier,
        }
    }

    async fn publish(&self, channel: &str, event: &ChatEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(?err, channel, "chat: event serialization failed");
                return;
            }
        };
        if let Err(err) = self.broadcaster.publish(channel, payload).await {
            warn!(?err, channel, "chat: websocket send failed");
        }
    }

    pub async fn broadcast(&self, session_id: &str, event: &ChatEvent) {
        self.publish(&session_channel(session_id), event).await;
    }

    /// Balance changes also go out on a dedicated channel for clients that
    /// only watch the balance.
    pub async fn broadcast_balance(&self, session_id: &str, balance: i64) {
        let event = ChatEvent::Balance { balance };
        self.publish(&session_channel(session_id), &event).await;
        self.publish(&balance_channel(session_id), &event).await;
    }

    /// One-line "new chat" alert to every contact channel on the policy.
    /// Sent only for a session's first message.
    pub async fn notify_new_chat(
        &self,
        policy: &Policy,
        session: &ChatSession,
        base_url: Option<&str>,
        first_message: Option<&str>,
    ) {
        let channels = ContactChannels::from_policy(policy);
        if channels.is_empty() {
            return;
        }
        let link = build_chat_link(base_url, session);
        let message = match first_message {
            Some(text) => format!("You have a new chat: \"{text}\" {link}"),
            None => format!("You have a new chat {link}"),
        };
        if let Err(err) = self.notifier.notify(&channels, &message, "chat.new").await {
            warn!(?err, session_id = %session.id, "chat: new chat notification failed");
        }
    }
}
